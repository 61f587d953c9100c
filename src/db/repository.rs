use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio::sync::OnceCell;
use tokio_rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{NewsRecord, SourceRow, StoredRecordMeta, ThemeRow};
use crate::sources::ResolvedSource;

use super::schema::SCHEMA;

/// In-memory foreign-key cache, keyed both ways for O(1) lookups.
///
/// Loaded at most once per process; after an out-of-band taxonomy change the
/// process must be restarted to see it.
#[derive(Debug, Default)]
pub struct LookupCache {
    sources_by_key: HashMap<String, SourceRow>,
    sources_by_id: HashMap<i64, SourceRow>,
    themes_by_code: HashMap<String, ThemeRow>,
    themes_by_id: HashMap<i64, ThemeRow>,
}

impl LookupCache {
    pub fn source_by_key(&self, key: &str) -> Option<&SourceRow> {
        self.sources_by_key.get(key)
    }

    #[allow(dead_code)]
    pub fn source_by_id(&self, id: i64) -> Option<&SourceRow> {
        self.sources_by_id.get(&id)
    }

    pub fn theme_by_code(&self, code: &str) -> Option<&ThemeRow> {
        self.themes_by_code.get(code)
    }

    #[allow(dead_code)]
    pub fn theme_by_id(&self, id: i64) -> Option<&ThemeRow> {
        self.themes_by_id.get(&id)
    }
}

pub struct Repository {
    conn: Connection,
    cache: OnceCell<LookupCache>,
}

// Column values for one news row after foreign-key resolution.
struct NewsRowValues {
    unique_id: String,
    source_id: i64,
    theme_l1_id: Option<i64>,
    theme_l2_id: Option<i64>,
    theme_l3_id: Option<i64>,
    most_specific_theme_id: Option<i64>,
    title: String,
    url: String,
    image_url: Option<String>,
    video_url: Option<String>,
    category: Option<String>,
    tags_json: String,
    content: String,
    editorial_lead: Option<String>,
    subtitle: Option<String>,
    published_at: String,
    updated_datetime: Option<String>,
    extracted_at: Option<String>,
    source_key: String,
    source_name: String,
    meta: StoredRecordMeta,
}

const INSERT_NEWS: &str = r#"INSERT INTO news (
        unique_id, source_id, theme_l1_id, theme_l2_id, theme_l3_id,
        most_specific_theme_id, title, url, image_url, video_url, category,
        tags, content, editorial_lead, subtitle, published_at,
        updated_datetime, extracted_at, source_key, source_name)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"#;

// unique_id, source_id and published_at are immutable once stored.
const ON_CONFLICT_UPDATE: &str = r#" ON CONFLICT(unique_id) DO UPDATE SET
        theme_l1_id = excluded.theme_l1_id,
        theme_l2_id = excluded.theme_l2_id,
        theme_l3_id = excluded.theme_l3_id,
        most_specific_theme_id = excluded.most_specific_theme_id,
        title = excluded.title,
        url = excluded.url,
        image_url = excluded.image_url,
        video_url = excluded.video_url,
        category = excluded.category,
        tags = excluded.tags,
        content = excluded.content,
        editorial_lead = excluded.editorial_lead,
        subtitle = excluded.subtitle,
        updated_datetime = excluded.updated_datetime,
        extracted_at = excluded.extracted_at,
        source_key = excluded.source_key,
        source_name = excluded.source_name,
        updated_at = datetime('now')"#;

const ON_CONFLICT_IGNORE: &str = " ON CONFLICT(unique_id) DO NOTHING";

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            cache: OnceCell::new(),
        })
    }

    /// Register configured sources so the cache can resolve their keys.
    /// Existing rows keep their surrogate id.
    pub async fn register_sources(&self, sources: &[ResolvedSource]) -> Result<()> {
        let rows: Vec<(String, String, String)> = sources
            .iter()
            .map(|s| (s.key.clone(), s.name.clone(), s.url.clone()))
            .collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO sources (key, name, url) VALUES (?1, ?2, ?3)",
                    )?;
                    for (key, name, url) in &rows {
                        stmt.execute(params![key, name, url])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn register_theme(
        &self,
        code: &str,
        label: &str,
        level: i64,
        parent_code: Option<&str>,
    ) -> Result<i64> {
        let code = code.to_string();
        let label = label.to_string();
        let parent_code = parent_code.map(|c| c.to_string());
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO themes (code, label, level, parent_code) VALUES (?1, ?2, ?3, ?4)",
                    params![code, label, level, parent_code],
                )?;
                let id = conn.query_row(
                    "SELECT id FROM themes WHERE code = ?1",
                    params![code],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Explicit cache-load step; concurrent first callers share one load.
    pub async fn load_cache(&self) -> Result<()> {
        self.cache().await.map(|_| ())
    }

    async fn cache(&self) -> Result<&LookupCache> {
        self.cache
            .get_or_try_init(|| async {
                let cache = self
                    .conn
                    .call(|conn| {
                        let mut cache = LookupCache::default();

                        let mut stmt =
                            conn.prepare("SELECT id, key, name, url, created_at FROM sources")?;
                        let sources = stmt
                            .query_map([], |row| Ok(source_from_row(row)))?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        for source in sources {
                            cache.sources_by_id.insert(source.id, source.clone());
                            cache.sources_by_key.insert(source.key.clone(), source);
                        }

                        let mut stmt = conn
                            .prepare("SELECT id, code, label, level, parent_code FROM themes")?;
                        let themes = stmt
                            .query_map([], |row| Ok(theme_from_row(row)))?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        for theme in themes {
                            cache.themes_by_id.insert(theme.id, theme.clone());
                            cache.themes_by_code.insert(theme.code.clone(), theme);
                        }

                        Ok(cache)
                    })
                    .await?;

                info!(
                    sources = cache.sources_by_key.len(),
                    themes = cache.themes_by_code.len(),
                    "lookup cache loaded"
                );
                Ok::<_, AppError>(cache)
            })
            .await
    }

    /// Batched idempotent upsert keyed on `unique_id`.
    ///
    /// Returns the number of rows actually written and metadata for rows that
    /// were newly inserted; no-op conflicts and updates are excluded so the
    /// notifier only sees genuinely new articles.
    pub async fn insert_news(
        &self,
        records: Vec<NewsRecord>,
        allow_update: bool,
    ) -> Result<(usize, Vec<StoredRecordMeta>)> {
        if records.is_empty() {
            return Err(AppError::InvalidInput(
                "news records list cannot be empty".to_string(),
            ));
        }

        let total = records.len();
        let cache = self.cache().await?;

        let mut rows = Vec::with_capacity(total);
        for record in records {
            let Some(source) = cache.source_by_key(&record.source_key) else {
                warn!(source = %record.source_key, url = %record.url, "unknown source key, dropping record");
                continue;
            };
            let resolve_theme = |code: &Option<String>| {
                code.as_deref()
                    .and_then(|c| cache.theme_by_code(c))
                    .map(|t| t.id)
            };

            rows.push(NewsRowValues {
                meta: StoredRecordMeta {
                    unique_id: record.unique_id.clone(),
                    source_key: record.source_key.clone(),
                    published_at: Some(record.published_at),
                },
                unique_id: record.unique_id,
                source_id: source.id,
                theme_l1_id: resolve_theme(&record.theme_l1_code),
                theme_l2_id: resolve_theme(&record.theme_l2_code),
                theme_l3_id: resolve_theme(&record.theme_l3_code),
                most_specific_theme_id: resolve_theme(&record.most_specific_theme_code),
                title: record.title,
                url: record.url,
                image_url: record.image_url,
                video_url: record.video_url,
                category: record.category,
                tags_json: serde_json::to_string(&record.tags)?,
                content: record.content,
                editorial_lead: record.editorial_lead,
                subtitle: record.subtitle,
                published_at: record.published_at.to_rfc3339(),
                updated_datetime: record.updated_at.map(|dt| dt.to_rfc3339()),
                extracted_at: record.extracted_at.map(|dt| dt.to_rfc3339()),
                source_key: record.source_key,
                source_name: source.name.clone(),
            });
        }

        if rows.is_empty() {
            warn!(total, "no valid records to store (all were dropped)");
            return Ok((0, Vec::new()));
        }

        let sql = if allow_update {
            format!("{}{}", INSERT_NEWS, ON_CONFLICT_UPDATE)
        } else {
            format!("{}{}", INSERT_NEWS, ON_CONFLICT_IGNORE)
        };

        let (stored, inserted) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut stored = 0usize;
                let mut inserted = Vec::new();
                {
                    let mut exists_stmt = tx.prepare("SELECT 1 FROM news WHERE unique_id = ?1")?;
                    let mut upsert_stmt = tx.prepare(&sql)?;

                    for row in rows {
                        let existed = exists_stmt.exists(params![row.unique_id])?;
                        let changed = upsert_stmt.execute(params![
                            row.unique_id,
                            row.source_id,
                            row.theme_l1_id,
                            row.theme_l2_id,
                            row.theme_l3_id,
                            row.most_specific_theme_id,
                            row.title,
                            row.url,
                            row.image_url,
                            row.video_url,
                            row.category,
                            row.tags_json,
                            row.content,
                            row.editorial_lead,
                            row.subtitle,
                            row.published_at,
                            row.updated_datetime,
                            row.extracted_at,
                            row.source_key,
                            row.source_name,
                        ])?;
                        stored += changed;
                        if !existed && changed > 0 {
                            inserted.push(row.meta);
                        }
                    }
                }
                tx.commit()?;
                Ok((stored, inserted))
            })
            .await?;

        info!(stored, total, allow_update, "news batch stored");
        Ok((stored, inserted))
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn source_from_row(row: &Row) -> SourceRow {
    SourceRow {
        id: row.get(0).unwrap(),
        key: row.get(1).unwrap(),
        name: row.get(2).unwrap(),
        url: row.get(3).unwrap(),
        created_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s)),
    }
}

fn theme_from_row(row: &Row) -> ThemeRow {
    ThemeRow {
        id: row.get(0).unwrap(),
        code: row.get(1).unwrap(),
        label: row.get(2).unwrap(),
        level: row.get(3).unwrap(),
        parent_code: row.get(4).unwrap(),
    }
}

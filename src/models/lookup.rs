use chrono::{DateTime, Utc};

/// Row from the sources table, cached in memory for foreign-key resolution.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub id: i64,
    pub key: String,
    pub name: String,
    #[allow(dead_code)]
    pub url: Option<String>,
    #[allow(dead_code)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row from the theme taxonomy table.
#[derive(Debug, Clone)]
pub struct ThemeRow {
    pub id: i64,
    pub code: String,
    #[allow(dead_code)]
    pub label: String,
    #[allow(dead_code)]
    pub level: i64,
    #[allow(dead_code)]
    pub parent_code: Option<String>,
}

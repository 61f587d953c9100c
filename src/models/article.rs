use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// One article as it comes out of a source page, before validation.
///
/// Every optional attribute is present with an explicit `None` default so the
/// normalizer never has to distinguish "missing" from "absent".
#[derive(Debug, Clone, Default)]
pub struct RawArticle {
    pub source_key: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub editorial_lead: Option<String>,
    pub subtitle: Option<String>,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub extracted_at: Option<DateTime<Utc>>,
    /// Set when extraction of this single item failed. Items with an error
    /// marker are dropped during normalization, never stored.
    pub error: Option<String>,
}

impl RawArticle {
    /// A placeholder for an item whose article page could not be processed.
    pub fn failed(source_key: &str, title: &str, url: &str, error: impl ToString) -> Self {
        Self {
            source_key: source_key.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// The canonical, storable record. Field order mirrors the news table's
/// column order, which the legacy columnar export depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRecord {
    pub unique_id: String,
    pub source_key: String,
    pub published_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub title: String,
    pub editorial_lead: Option<String>,
    pub subtitle: Option<String>,
    pub url: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub theme_l1_code: Option<String>,
    pub theme_l2_code: Option<String>,
    pub theme_l3_code: Option<String>,
    pub most_specific_theme_code: Option<String>,
    pub extracted_at: Option<DateTime<Utc>>,
}

/// Metadata for rows that were newly inserted, handed to the event notifier.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecordMeta {
    pub unique_id: String,
    pub source_key: String,
    pub published_at: Option<DateTime<FixedOffset>>,
}

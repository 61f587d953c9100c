//! Raw item validation and canonical record construction.
//!
//! Items flow through in input order; anything that cannot become a valid
//! canonical record is dropped with a warning, never surfaced as a run
//! failure.

use chrono::{DateTime, FixedOffset};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::models::{NewsRecord, RawArticle};

/// Content-derived identity key: stable across runs, so a re-scrape of the
/// same article maps onto the same row.
pub fn unique_id(source_key: &str, published_at: &DateTime<FixedOffset>, title: &str) -> String {
    let input = format!("{}_{}_{}", source_key, published_at.to_rfc3339(), title);
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Convert raw extracted items into storable canonical records.
///
/// Dropped on the way: error-marked items, items missing title/url/content,
/// and items whose publication time could not be resolved by any strategy
/// (a fabricated timestamp would corrupt the identity key).
pub fn normalize(items: Vec<RawArticle>) -> Vec<NewsRecord> {
    items.into_iter().filter_map(canonicalize).collect()
}

fn canonicalize(item: RawArticle) -> Option<NewsRecord> {
    if let Some(error) = &item.error {
        warn!(url = %item.url, error = %error, "skipping item with extraction error");
        return None;
    }

    let title = item.title.trim();
    let url = item.url.trim();
    let content = item.content.trim();
    if title.is_empty() || url.is_empty() || content.is_empty() {
        warn!(url = %item.url, "skipping incomplete item");
        return None;
    }

    let Some(published_at) = item.published_at else {
        warn!(url = %item.url, "skipping item without publication time");
        return None;
    };

    Some(NewsRecord {
        unique_id: unique_id(&item.source_key, &published_at, title),
        source_key: item.source_key,
        published_at,
        updated_at: item.updated_at,
        title: title.to_string(),
        editorial_lead: item.editorial_lead.filter(|l| !l.trim().is_empty()),
        subtitle: item.subtitle.filter(|s| !s.trim().is_empty()),
        url: url.to_string(),
        category: item.category,
        tags: item.tags,
        content: content.to_string(),
        image_url: item.image_url.filter(|u| !u.trim().is_empty()),
        video_url: item.video_url.filter(|u| !u.trim().is_empty()),
        theme_l1_code: None,
        theme_l2_code: None,
        theme_l3_code: None,
        most_specific_theme_code: None,
        extracted_at: item.extracted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::dates::brasilia_offset;
    use chrono::TimeZone;

    fn item(title: &str) -> RawArticle {
        RawArticle {
            source_key: "mec".to_string(),
            title: title.to_string(),
            url: format!("https://www.gov.br/mec/noticias/{}", title),
            content: "Conteúdo da notícia.".to_string(),
            published_at: brasilia_offset()
                .with_ymd_and_hms(2026, 2, 10, 17, 5, 0)
                .single(),
            ..RawArticle::default()
        }
    }

    #[test]
    fn identity_key_is_stable_across_calls() {
        let published = brasilia_offset()
            .with_ymd_and_hms(2026, 2, 10, 17, 5, 0)
            .unwrap();
        let a = unique_id("mec", &published, "Título");
        let b = unique_id("mec", &published, "Título");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn identity_key_differs_when_any_input_differs() {
        let published = brasilia_offset()
            .with_ymd_and_hms(2026, 2, 10, 17, 5, 0)
            .unwrap();
        let base = unique_id("mec", &published, "Título");
        assert_ne!(base, unique_id("mds", &published, "Título"));
        assert_ne!(base, unique_id("mec", &published, "Outro título"));
        let other_time = brasilia_offset()
            .with_ymd_and_hms(2026, 2, 10, 17, 6, 0)
            .unwrap();
        assert_ne!(base, unique_id("mec", &other_time, "Título"));
    }

    #[test]
    fn error_marked_items_are_dropped() {
        let mut bad = item("com-erro");
        bad.error = Some("HTTP 500".to_string());
        let records = normalize(vec![bad, item("ok")]);
        assert_eq!(records.len(), 1);
        assert!(records[0].url.ends_with("/ok"));
    }

    #[test]
    fn incomplete_items_are_dropped() {
        let mut no_title = item("a");
        no_title.title = "  ".to_string();
        let mut no_content = item("b");
        no_content.content = String::new();
        let mut no_url = item("c");
        no_url.url = String::new();

        assert!(normalize(vec![no_title, no_content, no_url]).is_empty());
    }

    #[test]
    fn unresolved_timestamp_drops_item() {
        let mut undated = item("sem-data");
        undated.published_at = None;
        assert!(normalize(vec![undated]).is_empty());
    }

    #[test]
    fn output_preserves_input_order() {
        let records = normalize(vec![item("um"), item("dois"), item("três")]);
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert!(urls[0].ends_with("/um"));
        assert!(urls[1].ends_with("/dois"));
        assert!(urls[2].ends_with("/três"));
    }

    #[test]
    fn optional_fields_default_to_none_not_empty_strings() {
        let mut raw = item("opcionais");
        raw.image_url = Some("   ".to_string());
        raw.editorial_lead = Some(String::new());
        let records = normalize(vec![raw]);
        assert_eq!(records[0].image_url, None);
        assert_eq!(records[0].editorial_lead, None);
        assert_eq!(records[0].category, None);
    }
}

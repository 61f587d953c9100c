//! Publication timestamp recovery.
//!
//! Source pages carry their dates in three places of decreasing reliability:
//! machine-readable JSON-LD metadata, free-text labels ("Publicado em
//! 10/02/2026 17h05", "17/11/2025 - 18:58"), and the coarse date printed on
//! the listing tile. Strategies are pure functions tried in that order; the
//! first hit wins and the winner is logged so per-source reliability can be
//! tracked.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;
use scraper::{Html, Selector};

/// All label dates are wall-clock Brasília time: fixed UTC-3, no DST.
pub fn brasilia_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("static UTC-3 offset")
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // DD/MM/YYYY HHhMM and DD/MM/YYYY - HH:MM
        Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s*(?:-\s*)?(\d{1,2})[h:](\d{2})")
            .expect("static date regex")
    })
}

fn jsonld_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| {
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
    })
}

fn published_value_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span.documentPublished span.value").expect("static selector"))
}

fn modified_value_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span.documentModified span.value").expect("static selector"))
}

fn label_host_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span, h5, div.data").expect("static selector"))
}

/// Parse a label like `10/02/2026 17h05` or `17/11/2025 - 18:58` into a
/// Brasília-time datetime. Returns `None` when no such pattern is present.
pub fn datetime_from_text(text: &str) -> Option<DateTime<FixedOffset>> {
    let caps = label_re().captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    brasilia_offset().from_local_datetime(&naive).single()
}

/// Parse the coarse `DD/MM/YYYY` date shown on a listing tile. EBC tiles
/// append the air time (`16/09/2025 - 13:40`), which is ignored here.
pub fn parse_listing_date(text: &str) -> Option<NaiveDate> {
    let date_part = text.trim().split(" - ").next()?.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%d/%m/%Y").ok()
}

/// Anchor a listing-tile date at local midnight. Worse than a real
/// publication time, better than discarding the item.
pub fn datetime_from_listing_date(date: NaiveDate) -> Option<DateTime<FixedOffset>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    brasilia_offset().from_local_datetime(&naive).single()
}

type DatetimePair = (DateTime<FixedOffset>, Option<DateTime<FixedOffset>>);

/// Strategy 1: JSON-LD metadata (`datePublished` / `dateModified`).
///
/// Malformed embedded JSON (a real occurrence: unescaped quotes inside the
/// headline) makes this strategy return `None` so the chain falls through.
pub fn datetimes_from_jsonld(doc: &Html) -> Option<DatetimePair> {
    for script in doc.select(jsonld_selector()) {
        let raw = script.text().collect::<String>();
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let mut candidates: Vec<&serde_json::Value> = Vec::new();
        match &value {
            serde_json::Value::Array(items) => candidates.extend(items.iter()),
            other => candidates.push(other),
        }
        if let Some(graph) = value.get("@graph").and_then(|g| g.as_array()) {
            candidates.extend(graph.iter());
        }

        for node in candidates {
            let published = node
                .get("datePublished")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            if let Some(published) = published {
                let updated = node
                    .get("dateModified")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
                return Some((published, updated));
            }
        }
    }
    None
}

/// Strategy 2: free-text labels.
///
/// Looks at the structured gov.br spans first (`documentPublished`'s value
/// span), then at inline label text ("Publicado em …", "No AR em …" on
/// TV Brasil, "Atualizado em …" for the modification time).
pub fn datetimes_from_label_text(doc: &Html) -> Option<DatetimePair> {
    let published = doc
        .select(published_value_selector())
        .find_map(|el| datetime_from_text(&el.text().collect::<String>()))
        .or_else(|| labelled_datetime(doc, &["Publicado em", "No AR em"]));

    let updated = doc
        .select(modified_value_selector())
        .find_map(|el| datetime_from_text(&el.text().collect::<String>()))
        .or_else(|| labelled_datetime(doc, &["Atualizado em"]));

    published.map(|p| (p, updated))
}

fn labelled_datetime(doc: &Html, labels: &[&str]) -> Option<DateTime<FixedOffset>> {
    doc.select(label_host_selector()).find_map(|el| {
        let text = el.text().collect::<String>();
        if labels.iter().any(|label| text.contains(label)) {
            datetime_from_text(&text)
        } else {
            None
        }
    })
}

pub struct ResolvedDatetimes {
    pub published: Option<DateTime<FixedOffset>>,
    pub updated: Option<DateTime<FixedOffset>>,
    /// Name of the strategy that produced the publication time.
    pub strategy: Option<&'static str>,
}

/// Run the article-page strategies in priority order, first hit wins.
/// The listing-tile fallback needs the tile and is applied by the extractor.
pub fn resolve_article_datetimes(doc: &Html) -> ResolvedDatetimes {
    let strategies: [(&'static str, fn(&Html) -> Option<DatetimePair>); 2] = [
        ("jsonld", datetimes_from_jsonld),
        ("label_text", datetimes_from_label_text),
    ];

    for (name, strategy) in strategies {
        if let Some((published, updated)) = strategy(doc) {
            return ResolvedDatetimes {
                published: Some(published),
                updated,
                strategy: Some(name),
            };
        }
    }

    ResolvedDatetimes {
        published: None,
        updated: None,
        strategy: None,
    }
}

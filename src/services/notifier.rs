//! Best-effort "record stored" event publishing.
//!
//! Articles are already persisted by the time this runs, so nothing here may
//! affect the scrape result: an unset endpoint disables publishing, and a
//! failed publish is logged and skipped.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::StoredRecordMeta;

const EVENT_VERSION: &str = "1.0";

pub struct EventNotifier {
    client: Client,
    endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
struct StoredEvent<'a> {
    unique_id: &'a str,
    source_key: &'a str,
    published_at: String,
    stored_at: String,
}

impl EventNotifier {
    pub fn new(endpoint: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        match &endpoint {
            Some(url) => info!(endpoint = %url, "event publishing enabled"),
            None => info!("event webhook not configured, publishing disabled"),
        }

        Self { client, endpoint }
    }

    pub fn enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Publish one message per newly stored record. All messages of one call
    /// share a correlation id; distinct calls get distinct ids.
    pub async fn notify_stored(&self, records: &[StoredRecordMeta]) -> usize {
        let Some(endpoint) = &self.endpoint else {
            return 0;
        };
        if records.is_empty() {
            return 0;
        }

        let correlation_id = Uuid::new_v4().to_string();
        let mut published = 0usize;

        for meta in records {
            let event = StoredEvent {
                unique_id: &meta.unique_id,
                source_key: &meta.source_key,
                published_at: meta
                    .published_at
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
                stored_at: Utc::now().to_rfc3339(),
            };

            let result = self
                .client
                .post(endpoint)
                .header("x-correlation-id", &correlation_id)
                .header("x-event-version", EVENT_VERSION)
                .json(&event)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => published += 1,
                Ok(response) => {
                    warn!(unique_id = %meta.unique_id, status = %response.status(), "event rejected by webhook")
                }
                Err(e) => {
                    warn!(unique_id = %meta.unique_id, error = %e, "event publish failed")
                }
            }
        }

        if published > 0 {
            info!(published, total = records.len(), "published stored-record events");
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::dates::brasilia_offset;
    use chrono::TimeZone;

    fn meta(unique_id: &str) -> StoredRecordMeta {
        StoredRecordMeta {
            unique_id: unique_id.to_string(),
            source_key: "mec".to_string(),
            published_at: brasilia_offset()
                .with_ymd_and_hms(2026, 2, 10, 17, 5, 0)
                .single(),
        }
    }

    #[tokio::test]
    async fn disabled_notifier_publishes_nothing() {
        let notifier = EventNotifier::new(None);
        assert!(!notifier.enabled());
        assert_eq!(notifier.notify_stored(&[meta("abc")]).await, 0);
    }

    #[tokio::test]
    async fn empty_batch_publishes_nothing() {
        let notifier = EventNotifier::new(Some("http://127.0.0.1:9/events".to_string()));
        assert!(notifier.enabled());
        assert_eq!(notifier.notify_stored(&[]).await, 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        // Nothing listens on the discard port; the publish must fail quietly.
        let notifier = EventNotifier::new(Some("http://127.0.0.1:9/events".to_string()));
        assert_eq!(notifier.notify_stored(&[meta("abc")]).await, 0);
    }
}

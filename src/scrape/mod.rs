pub mod coordinator;
pub mod dates;
pub mod extractor;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::RawArticle;

/// Seam between the batch coordinator and concrete site scrapers, so runs
/// can be exercised with injected sources.
#[async_trait]
pub trait SourceScraper: Send + Sync {
    fn key(&self) -> &str;

    /// Extract every article in the configured window. An `Err` fails the
    /// whole source; per-item problems surface as error-marked items.
    async fn scrape(&self, cancel: &CancellationToken) -> Result<Vec<RawArticle>>;
}

//! Batch orchestration across independently-failing sources.
//!
//! One source's failure never stops the others; only a storage failure of the
//! single bulk batch aborts the run. The execution mode decides whether
//! storage happens per source or once for the whole run, never which sources
//! end up processed.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{RawArticle, RunMetrics};
use crate::normalize;
use crate::scrape::SourceScraper;
use crate::services::EventNotifier;

pub struct ScrapeCoordinator<'a> {
    repository: &'a Repository,
    notifier: &'a EventNotifier,
    bulk_concurrency: usize,
}

impl<'a> ScrapeCoordinator<'a> {
    pub fn new(
        repository: &'a Repository,
        notifier: &'a EventNotifier,
        bulk_concurrency: usize,
    ) -> Self {
        Self {
            repository,
            notifier,
            bulk_concurrency: bulk_concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        scrapers: &[Box<dyn SourceScraper>],
        sequential: bool,
        allow_update: bool,
        cancel: &CancellationToken,
    ) -> Result<RunMetrics> {
        if sequential {
            self.run_sequential(scrapers, allow_update, cancel).await
        } else {
            self.run_bulk(scrapers, allow_update, cancel).await
        }
    }

    /// Extract, normalize and store one source at a time. A store failure is
    /// recorded against that source and the run moves on.
    async fn run_sequential(
        &self,
        scrapers: &[Box<dyn SourceScraper>],
        allow_update: bool,
        cancel: &CancellationToken,
    ) -> Result<RunMetrics> {
        let mut metrics = RunMetrics::default();

        for scraper in scrapers {
            let key = scraper.key().to_string();
            match scraper.scrape(cancel).await {
                Ok(items) if items.is_empty() => {
                    info!(source = %key, "no news found");
                    metrics.sources_processed.push(key);
                }
                Ok(items) => {
                    let scraped = items.len();
                    match self.store(items, allow_update).await {
                        Ok(saved) => {
                            metrics.articles_scraped += scraped;
                            metrics.articles_saved += saved;
                            metrics.sources_processed.push(key);
                        }
                        Err(e) => {
                            error!(source = %key, error = %e, "store failed");
                            metrics.record_failure(&key, e);
                        }
                    }
                }
                Err(e) => {
                    error!(source = %key, error = %e, "scrape failed");
                    metrics.record_failure(&key, e);
                }
            }
        }

        Ok(metrics)
    }

    /// Extract every source through a bounded worker pool, then store the
    /// concatenation as one batch. Completion order is unspecified.
    async fn run_bulk(
        &self,
        scrapers: &[Box<dyn SourceScraper>],
        allow_update: bool,
        cancel: &CancellationToken,
    ) -> Result<RunMetrics> {
        let mut metrics = RunMetrics::default();

        let results: Vec<(String, Result<Vec<RawArticle>>)> = stream::iter(scrapers)
            .map(|scraper| async move {
                (scraper.key().to_string(), scraper.scrape(cancel).await)
            })
            .buffer_unordered(self.bulk_concurrency)
            .collect()
            .await;

        let mut all_items = Vec::new();
        for (key, result) in results {
            match result {
                Ok(items) if items.is_empty() => {
                    info!(source = %key, "no news found");
                    metrics.sources_processed.push(key);
                }
                Ok(items) => {
                    all_items.extend(items);
                    metrics.sources_processed.push(key);
                }
                Err(e) => {
                    error!(source = %key, error = %e, "scrape failed");
                    metrics.record_failure(&key, e);
                }
            }
        }

        if all_items.is_empty() {
            info!("no news found for any source");
            return Ok(metrics);
        }

        metrics.articles_scraped = all_items.len();
        // The whole run shares one batch here, so a storage failure is fatal.
        metrics.articles_saved = self.store(all_items, allow_update).await?;
        Ok(metrics)
    }

    /// Normalize, persist, then fire best-effort notifications for rows that
    /// were newly inserted.
    async fn store(&self, items: Vec<RawArticle>, allow_update: bool) -> Result<usize> {
        let records = normalize::normalize(items);
        if records.is_empty() {
            info!("no valid records after normalization");
            return Ok(0);
        }

        let (stored, inserted) = self.repository.insert_news(records, allow_update).await?;
        if !inserted.is_empty() {
            let published = self.notifier.notify_stored(&inserted).await;
            debug!(published, "stored-record events published");
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::RunStatus;
    use crate::scrape::dates::brasilia_offset;
    use crate::sources::{ResolvedSource, SiteFamily};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tempfile::TempDir;

    enum Outcome {
        Items(Vec<RawArticle>),
        Empty,
        Fail(&'static str),
    }

    struct MockScraper {
        key: String,
        outcome: Outcome,
    }

    #[async_trait]
    impl SourceScraper for MockScraper {
        fn key(&self) -> &str {
            &self.key
        }

        async fn scrape(&self, cancel: &CancellationToken) -> Result<Vec<RawArticle>> {
            if cancel.is_cancelled() {
                return Err(AppError::Scrape("scrape cancelled".to_string()));
            }
            match &self.outcome {
                Outcome::Items(items) => Ok(items.clone()),
                Outcome::Empty => Ok(Vec::new()),
                Outcome::Fail(message) => Err(AppError::Scrape((*message).to_string())),
            }
        }
    }

    fn article(source_key: &str, title: &str) -> RawArticle {
        RawArticle {
            source_key: source_key.to_string(),
            title: title.to_string(),
            url: format!("https://www.gov.br/{}/noticias/{}", source_key, title),
            content: "Conteúdo da notícia.".to_string(),
            published_at: brasilia_offset()
                .with_ymd_and_hms(2026, 2, 10, 17, 5, 0)
                .single(),
            ..RawArticle::default()
        }
    }

    fn scraper(key: &str, outcome: Outcome) -> Box<dyn SourceScraper> {
        Box::new(MockScraper {
            key: key.to_string(),
            outcome,
        })
    }

    async fn repository() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("news.db");
        let repo = Repository::new(db_path.to_str().unwrap()).await.unwrap();
        let sources: Vec<ResolvedSource> = ["a", "b", "c"]
            .iter()
            .map(|key| ResolvedSource {
                key: key.to_string(),
                name: key.to_string(),
                url: format!("https://www.gov.br/{}/noticias", key),
                family: SiteFamily::GovBr,
            })
            .collect();
        repo.register_sources(&sources).await.unwrap();
        (dir, repo)
    }

    fn three_scrapers() -> Vec<Box<dyn SourceScraper>> {
        vec![
            scraper(
                "a",
                Outcome::Items(vec![article("a", "um"), article("a", "dois")]),
            ),
            scraper("b", Outcome::Fail("listing fetch failed")),
            scraper("c", Outcome::Items(vec![article("c", "três")])),
        ]
    }

    #[tokio::test]
    async fn sequential_isolates_one_failing_source() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let metrics = coordinator
            .run(&three_scrapers(), true, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(metrics.sources_processed, vec!["a", "c"]);
        assert_eq!(metrics.errors.len(), 1);
        assert_eq!(metrics.errors[0].source, "b");
        assert_eq!(metrics.articles_scraped, 3);
        assert_eq!(metrics.articles_saved, 3);
        assert_eq!(metrics.status(), RunStatus::Partial);
    }

    #[tokio::test]
    async fn bulk_isolates_one_failing_source() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let metrics = coordinator
            .run(&three_scrapers(), false, false, &CancellationToken::new())
            .await
            .unwrap();

        // Completion order is unspecified under the worker pool.
        assert_eq!(metrics.sources_processed.len(), 2);
        assert!(metrics.sources_processed.contains(&"a".to_string()));
        assert!(metrics.sources_processed.contains(&"c".to_string()));
        assert_eq!(metrics.errors.len(), 1);
        assert_eq!(metrics.errors[0].source, "b");
        assert_eq!(metrics.articles_scraped, 3);
        assert_eq!(metrics.articles_saved, 3);
        assert_eq!(metrics.status(), RunStatus::Partial);
    }

    #[tokio::test]
    async fn empty_source_still_counts_as_processed() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let scrapers = vec![scraper("a", Outcome::Empty)];
        let metrics = coordinator
            .run(&scrapers, true, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(metrics.sources_processed, vec!["a"]);
        assert_eq!(metrics.articles_scraped, 0);
        assert_eq!(metrics.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn execution_mode_does_not_change_dedup_outcome() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let first = coordinator
            .run(&three_scrapers(), true, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.articles_saved, 3);

        // The same articles again, this time as one bulk batch: every insert
        // is a conflict no-op.
        let second = coordinator
            .run(&three_scrapers(), false, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.articles_scraped, 3);
        assert_eq!(second.articles_saved, 0);
    }

    #[tokio::test]
    async fn incomplete_items_are_discarded_quietly() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let mut incomplete = article("a", "sem-corpo");
        incomplete.content = String::new();
        let scrapers = vec![scraper(
            "a",
            Outcome::Items(vec![article("a", "ok"), incomplete]),
        )];

        let metrics = coordinator
            .run(&scrapers, true, false, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(metrics.articles_scraped, 2);
        assert_eq!(metrics.articles_saved, 1);
        assert!(metrics.errors.is_empty());
        assert_eq!(metrics.status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_run_reports_interrupted_sources_as_failures() {
        let (_dir, repo) = repository().await;
        let notifier = EventNotifier::new(None);
        let coordinator = ScrapeCoordinator::new(&repo, &notifier, 4);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let metrics = coordinator
            .run(&three_scrapers(), true, false, &cancel)
            .await
            .unwrap();

        assert!(metrics.sources_processed.is_empty());
        assert_eq!(metrics.errors.len(), 3);
        assert_eq!(metrics.status(), RunStatus::Failed);
    }
}

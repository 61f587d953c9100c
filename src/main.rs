use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod db;
mod error;
mod models;
mod normalize;
mod scrape;
mod services;
mod sources;

use config::Config;
use db::Repository;
use error::Result;
use models::{RunMetrics, RunStatus, SourceFailure};
use scrape::coordinator::ScrapeCoordinator;
use scrape::extractor::{http_client, SiteExtractor};
use scrape::SourceScraper;
use services::EventNotifier;
use sources::SourceTable;

const USAGE: &str = "\
Usage: harvester --start-date YYYY-MM-DD [options]

Options:
  --start-date YYYY-MM-DD   first day of the scrape window (required)
  --end-date YYYY-MM-DD     last day of the window (defaults to the start date)
  --sources a,b,c           source keys to scrape (defaults to all active)
  --bulk                    extract every source first, then store once
  --allow-update            overwrite existing records with fresh fields
  --config PATH             explicit config file";

#[derive(Debug)]
struct RunOptions {
    start_date: NaiveDate,
    end_date: NaiveDate,
    sources: Option<Vec<String>>,
    sequential: bool,
    allow_update: bool,
    config_path: Option<String>,
}

impl RunOptions {
    fn parse(args: &[String]) -> std::result::Result<Self, String> {
        let mut start_date = None;
        let mut end_date = None;
        let mut sources = None;
        let mut sequential = true;
        let mut allow_update = false;
        let mut config_path = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--start-date" => start_date = Some(parse_date(iter.next(), "--start-date")?),
                "--end-date" => end_date = Some(parse_date(iter.next(), "--end-date")?),
                "--sources" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| "--sources requires a value".to_string())?;
                    sources = Some(
                        value
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>(),
                    );
                }
                "--bulk" => sequential = false,
                "--allow-update" => allow_update = true,
                "--config" => {
                    config_path = Some(
                        iter.next()
                            .ok_or_else(|| "--config requires a value".to_string())?
                            .clone(),
                    )
                }
                other => return Err(format!("unknown argument: {}", other)),
            }
        }

        let start_date = start_date.ok_or_else(|| "--start-date is required".to_string())?;
        let end_date = end_date.unwrap_or(start_date);
        if end_date < start_date {
            return Err("--end-date must not precede --start-date".to_string());
        }

        Ok(Self {
            start_date,
            end_date,
            sources,
            sequential,
            allow_update,
            config_path,
        })
    }
}

fn parse_date(value: Option<&String>, flag: &str) -> std::result::Result<NaiveDate, String> {
    let value = value.ok_or_else(|| format!("{} requires a value", flag))?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{} expects YYYY-MM-DD, got '{}'", flag, value))
}

#[derive(Debug, Serialize)]
struct RunReport {
    status: RunStatus,
    start_date: String,
    end_date: String,
    articles_scraped: usize,
    articles_saved: usize,
    sources_processed: Vec<String>,
    errors: Vec<SourceFailure>,
    message: String,
}

fn build_report(opts: &RunOptions, metrics: RunMetrics) -> RunReport {
    let status = metrics.status();
    let message = match status {
        RunStatus::Completed => "Scraping completed".to_string(),
        RunStatus::Partial => format!("Completed with {} error(s)", metrics.errors.len()),
        RunStatus::Failed => "All sources failed".to_string(),
    };

    RunReport {
        status,
        start_date: opts.start_date.to_string(),
        end_date: opts.end_date.to_string(),
        articles_scraped: metrics.articles_scraped,
        articles_saved: metrics.articles_saved,
        sources_processed: metrics.sources_processed,
        errors: metrics.errors,
        message,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match RunOptions::parse(&args) {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            std::process::exit(2);
        }
    };

    let config = match &opts.config_path {
        Some(path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    };

    let table = SourceTable::load(Path::new(&config.sources_path))?;
    let (selected, registry_failures) = table.resolve(opts.sources.as_deref());
    info!(
        selected = selected.len(),
        skipped = registry_failures.len(),
        start = %opts.start_date,
        end = %opts.end_date,
        "resolved source set"
    );

    let repository = Repository::new(&config.db_path).await?;
    repository.register_sources(&selected).await?;
    repository.load_cache().await?;
    let notifier = EventNotifier::new(config.events_webhook_url.clone());

    let client = http_client(config.fetch_timeout_secs, &config.user_agent);
    let scrapers: Vec<Box<dyn SourceScraper>> = selected
        .into_iter()
        .map(|source| {
            Box::new(SiteExtractor::new(
                client.clone(),
                source,
                opts.start_date,
                opts.end_date,
            )) as Box<dyn SourceScraper>
        })
        .collect();

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let coordinator = ScrapeCoordinator::new(&repository, &notifier, config.bulk_concurrency);
    let mut metrics = match coordinator
        .run(&scrapers, opts.sequential, opts.allow_update, &cancel)
        .await
    {
        Ok(metrics) => metrics,
        Err(e) => {
            error!(error = %e, "run aborted by storage failure");
            let mut metrics = RunMetrics::default();
            metrics.record_failure("storage", &e);
            metrics
        }
    };

    // Registry failures count like any other per-source error.
    let mut errors = registry_failures;
    errors.append(&mut metrics.errors);
    metrics.errors = errors;

    let report = build_report(&opts, metrics);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_a_full_command_line() {
        let opts = RunOptions::parse(&args(&[
            "--start-date",
            "2026-02-10",
            "--end-date",
            "2026-02-11",
            "--sources",
            "mec, mds",
            "--bulk",
            "--allow-update",
        ]))
        .unwrap();

        assert_eq!(opts.start_date, NaiveDate::from_ymd_opt(2026, 2, 10).unwrap());
        assert_eq!(opts.end_date, NaiveDate::from_ymd_opt(2026, 2, 11).unwrap());
        assert_eq!(opts.sources, Some(vec!["mec".to_string(), "mds".to_string()]));
        assert!(!opts.sequential);
        assert!(opts.allow_update);
    }

    #[test]
    fn end_date_defaults_to_start_date() {
        let opts = RunOptions::parse(&args(&["--start-date", "2026-02-10"])).unwrap();
        assert_eq!(opts.start_date, opts.end_date);
        assert!(opts.sequential);
        assert!(!opts.allow_update);
        assert_eq!(opts.sources, None);
    }

    #[test]
    fn start_date_is_required() {
        assert!(RunOptions::parse(&args(&["--end-date", "2026-02-10"])).is_err());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let result = RunOptions::parse(&args(&[
            "--start-date",
            "2026-02-11",
            "--end-date",
            "2026-02-10",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(RunOptions::parse(&args(&["--start-date", "2026-02-10", "--nope"])).is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// TOML file with the static source table (key -> url/active/family).
    #[serde(default = "default_sources_path")]
    pub sources_path: String,

    /// Webhook endpoint for "record stored" events. Unset disables publishing.
    pub events_webhook_url: Option<String>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Worker bound for the bulk extraction phase.
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("news-harvester");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("news.db").to_string_lossy().to_string()
}

fn default_sources_path() -> String {
    Config::config_dir()
        .join("sources.toml")
        .to_string_lossy()
        .to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_bulk_concurrency() -> usize {
    5
}

fn default_user_agent() -> String {
    "news-harvester/1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            sources_path: default_sources_path(),
            events_webhook_url: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            bulk_concurrency: default_bulk_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("news-harvester")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = toml::from_str("db_path = \"/tmp/test.db\"").unwrap();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.bulk_concurrency, 5);
        assert!(config.events_webhook_url.is_none());
    }
}

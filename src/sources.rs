use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SourceFailure;

/// Site family selecting the extraction profile for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteFamily {
    #[default]
    GovBr,
    AgenciaBrasil,
    TvBrasil,
}

/// One entry of the static source table. Read-only at run time; changing the
/// active flag requires deploying a new table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,

    /// Absent means active. Misconfigured entries stay visible in every run
    /// instead of silently disappearing.
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub family: SiteFamily,

    pub name: Option<String>,
    pub disabled_reason: Option<String>,
    pub disabled_date: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A source selected for one scrape run.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub key: String,
    pub name: String,
    pub url: String,
    pub family: SiteFamily,
}

/// The full source table, loaded once from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceTable {
    pub sources: BTreeMap<String, SourceEntry>,
}

impl SourceTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read source table {}: {}", path.display(), e))
        })?;
        let table: SourceTable = toml::from_str(&content)?;
        Ok(table)
    }

    /// Resolve a requested source set against the table.
    ///
    /// An empty or absent request selects every active source. A non-empty
    /// request is looked up key by key; unknown or inactive keys become
    /// failure entries so the rest of the batch still runs.
    pub fn resolve(&self, requested: Option<&[String]>) -> (Vec<ResolvedSource>, Vec<SourceFailure>) {
        let mut selected = Vec::new();
        let mut failures = Vec::new();

        match requested {
            Some(keys) if !keys.is_empty() => {
                for key in keys {
                    match self.sources.get(key) {
                        None => {
                            tracing::warn!(source = %key, "skipping source: not found");
                            failures.push(SourceFailure::new(key, "not found"));
                        }
                        Some(entry) if !entry.active => {
                            let reason = entry
                                .disabled_reason
                                .as_deref()
                                .unwrap_or("no reason provided");
                            tracing::warn!(source = %key, reason, "skipping source: inactive");
                            failures.push(SourceFailure::new(key, "inactive"));
                        }
                        Some(entry) => selected.push(resolved(key, entry)),
                    }
                }
            }
            _ => {
                let mut inactive = 0usize;
                for (key, entry) in &self.sources {
                    if entry.active {
                        selected.push(resolved(key, entry));
                    } else {
                        inactive += 1;
                    }
                }
                if inactive > 0 {
                    tracing::info!(count = inactive, "filtered inactive sources");
                }
            }
        }

        (selected, failures)
    }
}

fn resolved(key: &str, entry: &SourceEntry) -> ResolvedSource {
    ResolvedSource {
        key: key.to_string(),
        name: entry.name.clone().unwrap_or_else(|| key.to_string()),
        url: entry.url.clone(),
        family: entry.family,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SourceTable {
        toml::from_str(
            r#"
            [sources.mec]
            url = "https://www.gov.br/mec/pt-br/assuntos/noticias"
            name = "Ministério da Educação"

            [sources.mds]
            url = "https://www.gov.br/mds/pt-br/noticias-e-conteudos/desenvolvimento-social"

            [sources.cisc]
            url = "https://www.gov.br/pt-br/noticias"
            active = false
            disabled_reason = "generic portal listing"

            [sources.agencia_brasil]
            url = "https://agenciabrasil.ebc.com.br/ultimas"
            family = "agencia_brasil"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn active_defaults_to_true_when_absent() {
        let table = table();
        assert!(table.sources["mds"].active);
        assert!(!table.sources["cisc"].active);
    }

    #[test]
    fn resolve_all_filters_inactive() {
        let (selected, failures) = table().resolve(None);
        let keys: Vec<_> = selected.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["agencia_brasil", "mds", "mec"]);
        assert!(failures.is_empty());
    }

    #[test]
    fn resolve_empty_request_behaves_like_all() {
        let requested: Vec<String> = Vec::new();
        let (selected, failures) = table().resolve(Some(&requested));
        assert_eq!(selected.len(), 3);
        assert!(failures.is_empty());
    }

    #[test]
    fn unknown_key_becomes_failure_entry() {
        let requested = vec!["mec".to_string(), "nope".to_string()];
        let (selected, failures) = table().resolve(Some(&requested));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].key, "mec");
        assert_eq!(failures, vec![SourceFailure::new("nope", "not found")]);
    }

    #[test]
    fn inactive_key_becomes_failure_entry() {
        let requested = vec!["cisc".to_string()];
        let (selected, failures) = table().resolve(Some(&requested));
        assert!(selected.is_empty());
        assert_eq!(failures, vec![SourceFailure::new("cisc", "inactive")]);
    }

    #[test]
    fn display_name_falls_back_to_key() {
        let (selected, _) = table().resolve(Some(&["mds".to_string()]));
        assert_eq!(selected[0].name, "mds");
        let (selected, _) = table().resolve(Some(&["mec".to_string()]));
        assert_eq!(selected[0].name, "Ministério da Educação");
    }

    #[test]
    fn family_defaults_to_govbr() {
        let table = table();
        assert_eq!(table.sources["mec"].family, SiteFamily::GovBr);
        assert_eq!(table.sources["agencia_brasil"].family, SiteFamily::AgenciaBrasil);
    }
}

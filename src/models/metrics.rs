use serde::Serialize;

/// One source that could not be processed, with the reason.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

impl SourceFailure {
    pub fn new(source: &str, error: impl ToString) -> Self {
        Self {
            source: source.to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

/// Aggregate outcome of one scrape run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub articles_scraped: usize,
    pub articles_saved: usize,
    pub sources_processed: Vec<String>,
    pub errors: Vec<SourceFailure>,
}

impl RunMetrics {
    pub fn record_failure(&mut self, source: &str, error: impl ToString) {
        self.errors.push(SourceFailure::new(source, error));
    }

    pub fn status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Completed
        } else if self.sources_processed.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }
}

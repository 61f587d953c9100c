mod article;
mod lookup;
mod metrics;

pub use article::{NewsRecord, RawArticle, StoredRecordMeta};
pub use lookup::{SourceRow, ThemeRow};
pub use metrics::{RunMetrics, RunStatus, SourceFailure};

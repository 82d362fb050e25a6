//! Storage boundary: raw lines in, parsed rows / results / run records out.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::analyzer::{AnomalyResult, RunSummary};
use crate::parser::ParsedLogRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

/// Sentinel stored in run records when no file filter was applied.
pub const ALL_FILES: &str = "ALL";

/// Which raw lines a run reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFilter {
    All,
    File(String),
}

impl FileFilter {
    /// `None` and the "ALL" sentinel both mean no filter.
    pub fn from_option(name: Option<&str>) -> Self {
        match name {
            None => FileFilter::All,
            Some(n) if n == ALL_FILES => FileFilter::All,
            Some(n) => FileFilter::File(n.to_string()),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            FileFilter::All => None,
            FileFilter::File(n) => Some(n),
        }
    }
}

impl fmt::Display for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name().unwrap_or(ALL_FILES))
    }
}

/// A raw line as read back from storage. Columns may be null in a store that
/// was filled by other tools; the analyzer rejects rows without a file name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogRow {
    pub log_id: i64,
    pub file_name: Option<String>,
    pub raw_text: Option<String>,
}

/// What a pipeline run needs from storage. Implementations do not retry.
pub trait LogStore {
    fn load_raw(&self, filter: &FileFilter) -> Result<Vec<RawLogRow>, StoreError>;

    /// Replace the whole parsed-row set.
    fn replace_parsed(&self, records: &[ParsedLogRecord]) -> Result<(), StoreError>;

    /// Append results tagged with `run_id`. No deduplication.
    fn append_results(&self, run_id: &str, results: &[AnomalyResult]) -> Result<(), StoreError>;

    fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError>;
}

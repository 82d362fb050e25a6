//! logsift: unsupervised anomaly triage for plain-text log files.
//!
//! Modular structure:
//! - [`ingest`]: Read log files and directory trees into raw lines
//! - [`parser`]: Raw line → timestamp, level, message
//! - [`features`]: Structural signals, TF-IDF text vectors, standardization
//! - [`model`]: Isolation forest scoring, fitted-model save/load
//! - [`analyzer`]: Pipeline orchestrator (load → parse → features → score → persist)
//! - [`storage`]: Storage boundary and SQLite store
//! - [`explain`]: Rule-based explanations and run reports
//! - [`logging`]: Structured logging and NDJSON export

pub mod analyzer;
pub mod config;
pub mod explain;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod parser;
pub mod storage;

pub use analyzer::{Analyzer, AnomalyResult, PipelineError, RunOutcome, RunSummary, Stage};
pub use config::AnalyzerConfig;
pub use explain::{AnomalyReport, ExplainEngine};
pub use features::{FeatureComposer, FeatureRow, StructuralFeatures, TfidfVectorizer};
pub use ingest::{LogCollector, RawLogLine};
pub use logging::StructuredLogger;
pub use model::{FittedModel, IsolationForest, ModelError};
pub use parser::{LogLevel, ParsedLogRecord};
pub use storage::{FileFilter, LogStore, SqliteStore};

//! Structured logging and NDJSON export of scored rows.

mod format;

pub use format::{ResultEvent, StructuredLogger};

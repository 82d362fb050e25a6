//! Raw log line → structured record (timestamp, level, message).

mod line;

pub use line::{parse_line, ParsedLine};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity recognised in a log line. `Info` is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
    Debug,
    Summary,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Debug,
        LogLevel::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Debug => "DEBUG",
            LogLevel::Summary => "SUMMARY",
        }
    }

    /// ERROR and CRITICAL lines.
    pub fn is_severe(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// A parsed row. `id` is the storage key of the raw line it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLogRecord {
    pub id: i64,
    pub file_name: String,
    pub log_level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_extracted: Option<String>,
}

impl ParsedLogRecord {
    /// Parse `raw_text` and attach the row identity.
    pub fn from_raw(id: i64, file_name: impl Into<String>, raw_text: &str) -> Self {
        let ParsedLine {
            log_level,
            message,
            timestamp_extracted,
        } = parse_line(raw_text);
        Self {
            id,
            file_name: file_name.into(),
            log_level,
            message,
            timestamp_extracted,
        }
    }
}

//! Single-line parser. Total: every input yields a record.

use super::LogLevel;
use fancy_regex::Regex;
use std::sync::LazyLock;

static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2})\s*").expect("valid regex literal")
});

/// Level tokens in priority order. The first rule whose token occurs anywhere
/// in the line wins, so "ERROR ... WARNING" is ERROR and a CRITICAL line that
/// mentions "WARNING" is WARNING. Matching is case-sensitive.
const LEVEL_RULES: &[(&str, LogLevel)] = &[
    ("ERROR", LogLevel::Error),
    ("WARNING", LogLevel::Warning),
    ("WARN", LogLevel::Warning),
    ("CRITICAL", LogLevel::Critical),
    ("FATAL", LogLevel::Critical),
    ("DEBUG", LogLevel::Debug),
    ("SUMMARY", LogLevel::Summary),
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLine {
    pub log_level: LogLevel,
    pub message: String,
    pub timestamp_extracted: Option<String>,
}

pub fn parse_line(raw: &str) -> ParsedLine {
    if raw.trim().is_empty() {
        return ParsedLine::default();
    }

    let (timestamp_extracted, working) = split_timestamp(raw);
    let log_level = detect_level(working);
    let message = third_field(working).unwrap_or(working).to_string();

    ParsedLine {
        log_level,
        message,
        timestamp_extracted,
    }
}

fn split_timestamp(line: &str) -> (Option<String>, &str) {
    match LEADING_TIMESTAMP.captures(line) {
        Ok(Some(caps)) => {
            let ts = caps.get(1).map(|m| m.as_str().to_string());
            let end = caps.get(0).map_or(0, |m| m.end());
            (ts, &line[end..])
        }
        _ => (None, line),
    }
}

fn detect_level(line: &str) -> LogLevel {
    LEVEL_RULES
        .iter()
        .find(|(token, _)| line.contains(token))
        .map_or(LogLevel::Info, |(_, level)| *level)
}

/// Everything after the first two whitespace-delimited tokens, if anything is left.
fn third_field(line: &str) -> Option<&str> {
    let mut rest = line;
    for _ in 0..2 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        rest = &rest[end..];
    }
    let rest = rest.trim_start();
    (!rest.is_empty()).then_some(rest)
}

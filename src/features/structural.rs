//! Structural signals per record. Message frequency needs a full pass over the
//! batch, so extraction is batch-level.

use crate::parser::{LogLevel, ParsedLogRecord};
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

pub const STRUCTURAL_FEATURE_COUNT: usize = 12;

/// Column names in matrix order.
pub const STRUCTURAL_FEATURE_NAMES: [&str; STRUCTURAL_FEATURE_COUNT] = [
    "msg_len",
    "has_error",
    "has_warning",
    "has_critical",
    "has_failure",
    "has_exception",
    "is_unauthorized",
    "is_connection_issue",
    "has_number",
    "has_special_chars",
    "message_frequency",
    "is_rare_message",
];

/// Messages seen at most this many times in the batch are rare.
const RARE_MESSAGE_MAX: u32 = 2;

static FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)fail(ed|ure)?").expect("valid regex literal"));
static CONNECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)connection|network|latency|timeout").expect("valid regex literal")
});
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex literal"));
static SPECIAL_CHAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex literal"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralFeatures {
    pub msg_len: u32,
    pub has_error: bool,
    pub has_warning: bool,
    pub has_critical: bool,
    pub has_failure: bool,
    pub has_exception: bool,
    pub is_unauthorized: bool,
    pub is_connection_issue: bool,
    pub has_number: bool,
    /// Count of characters that are neither word characters nor whitespace.
    pub has_special_chars: u32,
    /// Identical messages in the batch, self included.
    pub message_frequency: u32,
    pub is_rare_message: bool,
}

impl StructuralFeatures {
    /// Extract features for every record. Frequencies are batch-local: the
    /// same message can be rare in one run and common in the next.
    pub fn from_batch(records: &[ParsedLogRecord]) -> Vec<Self> {
        let counts = message_frequencies(records.iter().map(|r| r.message.as_str()));
        records
            .iter()
            .map(|r| {
                let frequency = counts.get(r.message.as_str()).copied().unwrap_or(1);
                Self::from_record(r, frequency)
            })
            .collect()
    }

    fn from_record(record: &ParsedLogRecord, message_frequency: u32) -> Self {
        let msg = record.message.as_str();
        let lower = msg.to_lowercase();
        StructuralFeatures {
            msg_len: msg.chars().count() as u32,
            has_error: record.log_level == LogLevel::Error,
            has_warning: record.log_level == LogLevel::Warning,
            has_critical: record.log_level == LogLevel::Critical,
            has_failure: matches(&FAILURE, msg),
            has_exception: lower.contains("exception"),
            is_unauthorized: lower.contains("unauthorized"),
            is_connection_issue: matches(&CONNECTION, msg),
            has_number: matches(&DIGITS, msg),
            has_special_chars: SPECIAL_CHAR.find_iter(msg).filter(Result::is_ok).count() as u32,
            message_frequency,
            is_rare_message: message_frequency <= RARE_MESSAGE_MAX,
        }
    }

    /// Numeric encoding in [`STRUCTURAL_FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; STRUCTURAL_FEATURE_COUNT] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.msg_len as f64,
            flag(self.has_error),
            flag(self.has_warning),
            flag(self.has_critical),
            flag(self.has_failure),
            flag(self.has_exception),
            flag(self.is_unauthorized),
            flag(self.is_connection_issue),
            flag(self.has_number),
            self.has_special_chars as f64,
            self.message_frequency as f64,
            flag(self.is_rare_message),
        ]
    }
}

/// Exact-match message counts over a batch.
pub fn message_frequencies<'a>(messages: impl IntoIterator<Item = &'a str>) -> HashMap<&'a str, u32> {
    let mut counts = HashMap::new();
    for m in messages {
        *counts.entry(m).or_insert(0) += 1;
    }
    counts
}

fn matches(re: &Regex, text: &str) -> bool {
    re.is_match(text).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, level: LogLevel, message: &str) -> ParsedLogRecord {
        ParsedLogRecord {
            id,
            file_name: "test.log".into(),
            log_level: level,
            message: message.into(),
            timestamp_extracted: None,
        }
    }

    #[test]
    fn duplicated_message_counts_twice_and_is_rare() {
        let mut batch: Vec<ParsedLogRecord> = (0..8)
            .map(|i| record(i, LogLevel::Info, "heartbeat ok"))
            .collect();
        batch.push(record(8, LogLevel::Error, "X"));
        batch.push(record(9, LogLevel::Error, "X"));

        let feats = StructuralFeatures::from_batch(&batch);
        assert_eq!(feats.len(), 10);
        assert_eq!(feats[8].message_frequency, 2);
        assert_eq!(feats[9].message_frequency, 2);
        assert!(feats[8].is_rare_message);
        assert!(feats[9].is_rare_message);
        assert_eq!(feats[0].message_frequency, 8);
        assert!(!feats[0].is_rare_message);
    }

    #[test]
    fn keyword_and_level_flags() {
        let batch = vec![
            record(1, LogLevel::Error, "Database connection failed: timeout after 30s"),
            record(2, LogLevel::Critical, "Unauthorized access attempt from 10.0.0.1"),
            record(3, LogLevel::Warning, "NullPointerException in handler"),
            record(4, LogLevel::Info, "all good"),
        ];
        let f = StructuralFeatures::from_batch(&batch);

        assert!(f[0].has_error && f[0].has_failure && f[0].is_connection_issue && f[0].has_number);
        assert!(!f[0].has_warning && !f[0].has_critical);
        assert!(f[1].has_critical && f[1].is_unauthorized && f[1].has_number);
        assert!(f[2].has_warning && f[2].has_exception && !f[2].has_number);
        assert_eq!(f[3], StructuralFeatures {
            msg_len: 8,
            message_frequency: 1,
            is_rare_message: true,
            ..Default::default()
        });
    }

    #[test]
    fn special_chars_exclude_word_characters() {
        let batch = vec![record(1, LogLevel::Info, "a_b: [x]! 42%")];
        let f = StructuralFeatures::from_batch(&batch);
        // ':' '[' ']' '!' '%' ; underscore is a word character
        assert_eq!(f[0].has_special_chars, 5);
        assert_eq!(f[0].msg_len, 13);
    }

    #[test]
    fn failure_pattern_is_case_insensitive() {
        let batch = vec![
            record(1, LogLevel::Info, "FAILURE detected"),
            record(2, LogLevel::Info, "Network Latency spike"),
        ];
        let f = StructuralFeatures::from_batch(&batch);
        assert!(f[0].has_failure);
        assert!(f[1].is_connection_issue);
    }

    #[test]
    fn array_order_matches_names() {
        let f = StructuralFeatures {
            msg_len: 10,
            has_special_chars: 3,
            message_frequency: 4,
            has_error: true,
            ..Default::default()
        };
        let a = f.to_array();
        assert_eq!(a.len(), STRUCTURAL_FEATURE_NAMES.len());
        assert_eq!(a[0], 10.0);
        assert_eq!(a[1], 1.0);
        assert_eq!(a[9], 3.0);
        assert_eq!(a[10], 4.0);
        assert_eq!(a[11], 0.0);
    }
}

//! Point-based confidence for one result, judged against the whole result set.

use crate::analyzer::AnomalyResult;
use crate::features::message_frequencies;
use crate::parser::LogLevel;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex literal"));

const SEVERE_LEVEL_POINTS: u32 = 25;
const KEYWORD_POINTS: u32 = 15;
const EXTREMELY_RARE_POINTS: u32 = 30;
const UNCOMMON_POINTS: u32 = 15;
const LENGTH_POINTS: u32 = 10;
const SPECIAL_CHAR_POINTS: u32 = 5;
const NUMBERS_POINTS: u32 = 5;
const ERROR_INDICATOR_POINTS: u32 = 10;
const MAX_CONFIDENCE: u32 = 100;

const SPECIAL_CHAR_LIMIT: usize = 10;
const NUMBER_LIMIT: usize = 5;
const ERROR_INDICATOR_MIN: usize = 2;

/// Each keyword found adds points independently.
const KEYWORDS: [(&str, &str); 10] = [
    ("fail", "Contains failure indicators"),
    ("exception", "Exception detected"),
    ("unauthorized", "Unauthorized access attempt"),
    ("timeout", "Timeout issue"),
    ("connection", "Connection problem"),
    ("denied", "Access denied"),
    ("attack", "Potential security threat"),
    ("locked", "Account locking event"),
    ("breach", "Security breach indicator"),
    ("malicious", "Malicious activity"),
];

const ERROR_INDICATORS: [&str; 7] = ["error", "fail", "exception", "denied", "invalid", "unable", "cannot"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    SevereLevel { level: LogLevel },
    Keyword { keyword: String, description: String },
    ExtremelyRare { count: usize, percent: f64 },
    Uncommon { count: usize, percent: f64 },
    UnusuallyLong { length: usize, mean: f64 },
    UnusuallyShort { length: usize, mean: f64 },
    SpecialChars { count: usize },
    ManyNumbers { count: usize },
    ErrorIndicators { count: usize },
}

impl Reason {
    pub fn points(&self) -> u32 {
        match self {
            Reason::SevereLevel { .. } => SEVERE_LEVEL_POINTS,
            Reason::Keyword { .. } => KEYWORD_POINTS,
            Reason::ExtremelyRare { .. } => EXTREMELY_RARE_POINTS,
            Reason::Uncommon { .. } => UNCOMMON_POINTS,
            Reason::UnusuallyLong { .. } | Reason::UnusuallyShort { .. } => LENGTH_POINTS,
            Reason::SpecialChars { .. } => SPECIAL_CHAR_POINTS,
            Reason::ManyNumbers { .. } => NUMBERS_POINTS,
            Reason::ErrorIndicators { .. } => ERROR_INDICATOR_POINTS,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::SevereLevel { level } => write!(f, "High severity level: {level}"),
            Reason::Keyword { description, .. } => f.write_str(description),
            Reason::ExtremelyRare { count, percent } => {
                write!(f, "Extremely rare message (appears {count} times, {percent:.2}% of logs)")
            }
            Reason::Uncommon { count, percent } => {
                write!(f, "Uncommon message (appears {count} times, {percent:.1}% of logs)")
            }
            Reason::UnusuallyLong { length, mean } => {
                write!(f, "Unusually long message ({length} chars vs avg {mean:.0})")
            }
            Reason::UnusuallyShort { length, mean } => {
                write!(f, "Unusually short message ({length} chars vs avg {mean:.0})")
            }
            Reason::SpecialChars { count } => write!(f, "High special character count ({count} characters)"),
            Reason::ManyNumbers { count } => write!(f, "Multiple numeric values ({count} numbers found)"),
            Reason::ErrorIndicators { count } => {
                write!(f, "Multiple error indicators ({count} error-related terms)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub reasons: Vec<Reason>,
    /// 0-100, sum of reason points, capped.
    pub confidence: u32,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Why this is anomalous (confidence: {}%):", self.confidence)?;
        if self.reasons.is_empty() {
            writeln!(f, "  - Complex pattern detected by TF-IDF vectorization")?;
            return writeln!(f, "  - Unusual combination of words/features");
        }
        for r in &self.reasons {
            writeln!(f, "  - {r}")?;
        }
        Ok(())
    }
}

/// Batch statistics the heuristic compares each row against.
pub struct ExplainEngine {
    counts: HashMap<String, usize>,
    total: usize,
    mean_len: f64,
    /// Sample standard deviation; `None` with fewer than two rows.
    std_len: Option<f64>,
}

impl ExplainEngine {
    pub fn new(context: &[AnomalyResult]) -> Self {
        let counts = message_frequencies(context.iter().map(|r| r.message.as_str()))
            .into_iter()
            .map(|(m, c)| (m.to_string(), c as usize))
            .collect();
        let lens: Vec<f64> = context.iter().map(|r| r.message.chars().count() as f64).collect();
        let total = lens.len();
        let mean_len = if total == 0 { 0.0 } else { lens.iter().sum::<f64>() / total as f64 };
        let std_len = (total >= 2).then(|| {
            let ss: f64 = lens.iter().map(|l| (l - mean_len).powi(2)).sum();
            (ss / (total - 1) as f64).sqrt()
        });
        Self {
            counts,
            total,
            mean_len,
            std_len,
        }
    }

    pub fn explain(&self, result: &AnomalyResult) -> Explanation {
        let message = result.message.as_str();
        let lower = message.to_lowercase();
        let mut reasons = Vec::new();

        if result.log_level.is_severe() {
            reasons.push(Reason::SevereLevel { level: result.log_level });
        }

        reasons.extend(KEYWORDS.iter().filter(|(k, _)| lower.contains(k)).map(|(k, d)| Reason::Keyword {
            keyword: k.to_string(),
            description: d.to_string(),
        }));

        if self.total > 0 {
            let count = self.counts.get(message).copied().unwrap_or(0);
            let percent = count as f64 / self.total as f64 * 100.0;
            if percent < 1.0 {
                reasons.push(Reason::ExtremelyRare { count, percent });
            } else if percent < 5.0 {
                reasons.push(Reason::Uncommon { count, percent });
            }
        }

        if let Some(std) = self.std_len {
            let length = message.chars().count();
            let len = length as f64;
            if len > self.mean_len + 2.0 * std {
                reasons.push(Reason::UnusuallyLong { length, mean: self.mean_len });
            } else if len < self.mean_len - 2.0 * std {
                reasons.push(Reason::UnusuallyShort { length, mean: self.mean_len });
            }
        }

        let special = message
            .chars()
            .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
            .count();
        if special > SPECIAL_CHAR_LIMIT {
            reasons.push(Reason::SpecialChars { count: special });
        }

        let numbers = NUMBER.find_iter(message).filter(Result::is_ok).count();
        if numbers > NUMBER_LIMIT {
            reasons.push(Reason::ManyNumbers { count: numbers });
        }

        let indicators = ERROR_INDICATORS.iter().filter(|i| lower.contains(*i)).count();
        if indicators >= ERROR_INDICATOR_MIN {
            reasons.push(Reason::ErrorIndicators { count: indicators });
        }

        let confidence = reasons.iter().map(Reason::points).sum::<u32>().min(MAX_CONFIDENCE);
        Explanation { reasons, confidence }
    }
}

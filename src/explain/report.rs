//! Aggregate statistics over one run's results.

use crate::analyzer::AnomalyResult;
use crate::parser::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const TOP_LEVELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRange {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

impl ProbabilityRange {
    fn over(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for v in values {
            n += 1;
            sum += v;
            max = max.max(v);
            min = min.min(v);
        }
        (n > 0).then(|| Self {
            avg: sum / n as f64,
            max,
            min,
        })
    }
}

/// Shape of one side of the normal/anomalous split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub count: usize,
    /// Share of all results, 0-100.
    pub percent: f64,
    pub mean_message_length: f64,
    /// Most frequent levels first, at most five.
    pub levels: Vec<(LogLevel, usize)>,
}

impl GroupProfile {
    fn of<'a>(rows: impl IntoIterator<Item = &'a AnomalyResult>, total: usize) -> Self {
        let mut count = 0usize;
        let mut len_sum = 0usize;
        let mut by_level: HashMap<LogLevel, usize> = HashMap::new();
        for r in rows {
            count += 1;
            len_sum += r.message.chars().count();
            *by_level.entry(r.log_level).or_insert(0) += 1;
        }
        Self {
            count,
            percent: percent(count, total),
            mean_message_length: if count == 0 { 0.0 } else { len_sum as f64 / count as f64 },
            levels: ranked_levels(by_level, TOP_LEVELS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub total: usize,
    /// Anomaly count per level with its share of all anomalies.
    pub anomalies_by_level: Vec<(LogLevel, usize, f64)>,
    /// `None` when nothing was flagged.
    pub probability: Option<ProbabilityRange>,
    pub normal: GroupProfile,
    pub anomalous: GroupProfile,
}

impl AnomalyReport {
    pub fn from_results(results: &[AnomalyResult]) -> Self {
        let total = results.len();
        let anomalous = GroupProfile::of(results.iter().filter(|r| r.is_anomaly), total);
        let normal = GroupProfile::of(results.iter().filter(|r| !r.is_anomaly), total);

        let mut by_level: HashMap<LogLevel, usize> = HashMap::new();
        for r in results.iter().filter(|r| r.is_anomaly) {
            *by_level.entry(r.log_level).or_insert(0) += 1;
        }
        let anomalies_by_level = ranked_levels(by_level, LogLevel::ALL.len())
            .into_iter()
            .map(|(level, n)| (level, n, percent(n, anomalous.count)))
            .collect();

        let probability = ProbabilityRange::over(
            results.iter().filter(|r| r.is_anomaly).map(|r| r.anomaly_probability),
        );

        Self {
            total,
            anomalies_by_level,
            probability,
            normal,
            anomalous,
        }
    }
}

impl fmt::Display for AnomalyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} results, {} anomalous ({:.1}%)",
            self.total, self.anomalous.count, self.anomalous.percent
        )?;
        if !self.anomalies_by_level.is_empty() {
            writeln!(f, "Anomalies by level:")?;
            for (level, n, pct) in &self.anomalies_by_level {
                writeln!(f, "  {level:<8} {n:>6} ({pct:.1}%)")?;
            }
        }
        if let Some(p) = self.probability {
            writeln!(
                f,
                "Anomaly probability: avg {:.4}, max {:.4}, min {:.4}",
                p.avg, p.max, p.min
            )?;
        }
        for (name, g) in [("Normal", &self.normal), ("Anomalous", &self.anomalous)] {
            write!(
                f,
                "{name}: {} rows, mean length {:.1}",
                g.count, g.mean_message_length
            )?;
            let levels: Vec<String> = g.levels.iter().map(|(l, n)| format!("{l}={n}")).collect();
            if levels.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, ", levels {}", levels.join(" "))?;
            }
        }
        Ok(())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Count descending, then level declaration order.
fn ranked_levels(counts: HashMap<LogLevel, usize>, limit: usize) -> Vec<(LogLevel, usize)> {
    let mut out: Vec<(LogLevel, usize)> = LogLevel::ALL
        .into_iter()
        .filter_map(|l| counts.get(&l).map(|&n| (l, n)))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: LogLevel, message: &str, prob: f64, anomalous: bool) -> AnomalyResult {
        AnomalyResult {
            record_id: 0,
            file_name: "r.log".into(),
            log_level: level,
            message: message.into(),
            anomaly_score: if anomalous { -1 } else { 1 },
            anomaly_probability: prob,
            is_anomaly: anomalous,
        }
    }

    #[test]
    fn splits_groups_and_ranges() {
        let rows = vec![
            row(LogLevel::Info, "abcd", 0.40, false),
            row(LogLevel::Info, "abcdef", 0.42, false),
            row(LogLevel::Debug, "ab", 0.45, false),
            row(LogLevel::Error, "boom boom", 0.70, true),
            row(LogLevel::Error, "boom", 0.60, true),
            row(LogLevel::Warning, "hmm", 0.65, true),
        ];
        let report = AnomalyReport::from_results(&rows);

        assert_eq!(report.total, 6);
        assert_eq!(report.anomalous.count, 3);
        assert_eq!(report.normal.count, 3);
        assert!((report.anomalous.percent - 50.0).abs() < 1e-9);
        assert!((report.normal.mean_message_length - 4.0).abs() < 1e-9);
        assert_eq!(report.normal.levels, vec![(LogLevel::Info, 2), (LogLevel::Debug, 1)]);

        assert_eq!(report.anomalies_by_level[0].0, LogLevel::Error);
        assert_eq!(report.anomalies_by_level[0].1, 2);
        assert_eq!(report.anomalies_by_level[1].0, LogLevel::Warning);

        let p = report.probability.unwrap();
        assert!((p.avg - 0.65).abs() < 1e-9);
        assert_eq!(p.max, 0.70);
        assert_eq!(p.min, 0.60);
    }

    #[test]
    fn no_anomalies_has_no_probability_range() {
        let rows = vec![row(LogLevel::Info, "ok", 0.5, false); 3];
        let report = AnomalyReport::from_results(&rows);
        assert!(report.probability.is_none());
        assert!(report.anomalies_by_level.is_empty());
        assert_eq!(report.anomalous.mean_message_length, 0.0);
        assert!(report.to_string().starts_with("3 results, 0 anomalous"));
    }

    #[test]
    fn empty_input() {
        let report = AnomalyReport::from_results(&[]);
        assert_eq!(report.total, 0);
        assert_eq!(report.normal.percent, 0.0);
    }
}

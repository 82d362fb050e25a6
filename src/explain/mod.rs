//! Human-readable explanations for flagged rows. A rule-based heuristic kept
//! apart from the isolation forest: it re-derives its own 0-100 confidence
//! from the result set and never feeds back into scoring.

mod engine;
mod report;

pub use engine::{ExplainEngine, Explanation, Reason};
pub use report::{AnomalyReport, GroupProfile, ProbabilityRange};

//! Isolation-forest anomaly scoring and the fitted-model value object that
//! bundles everything transform-only scoring needs.

mod detector;
mod forest;
mod persist;

pub use detector::{fit_predict, FittedModel, Predictions, ScoredBatch, ANOMALY, NORMAL};
pub use forest::{contamination_threshold, IsolationForest, IsolationTree};
pub use persist::{ModelManifest, MANIFEST_FILE};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Input width differs from what the model was fitted on. Never padded or truncated.
    #[error("feature shape mismatch: model expects {expected} columns, input has {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model artifact {file} failed its integrity check")]
    DigestMismatch { file: String },
    #[error("model artifact {file} missing from manifest")]
    MissingArtifact { file: String },
    #[error("model io: {0}")]
    Io(#[from] std::io::Error),
    #[error("model (de)serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

//! Feature engineering: structural signals, TF-IDF text vectors, and the
//! standardized matrix the isolation forest is fitted on.

mod pipeline;
mod stopwords;
mod structural;
mod text;

pub use pipeline::{assemble_matrix, feature_rows, ComposedBatch, FeatureComposer, Standardizer};
pub use stopwords::is_stop_word;
pub use structural::{message_frequencies, StructuralFeatures, STRUCTURAL_FEATURE_COUNT, STRUCTURAL_FEATURE_NAMES};
pub use text::{Degraded, FittedVectorizer, TermRanking, TfidfVectorizer};

use serde::{Deserialize, Serialize};

/// Per-record features before standardization.
///
/// `text_vector` positions are only meaningful for the vectorizer fit that
/// produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub record_id: i64,
    pub structural: StructuralFeatures,
    pub text_vector: Vec<f64>,
}

impl FeatureRow {
    pub fn width(&self) -> usize {
        STRUCTURAL_FEATURE_COUNT + self.text_vector.len()
    }

    /// Structural columns followed by text columns.
    pub fn to_vector(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width());
        out.extend_from_slice(&self.structural.to_array());
        out.extend_from_slice(&self.text_vector);
        out
    }
}

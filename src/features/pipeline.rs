//! Feature pipeline: records → structural + text rows → concatenated matrix →
//! standardized matrix.

use super::{Degraded, FeatureRow, FittedVectorizer, StructuralFeatures, TfidfVectorizer, STRUCTURAL_FEATURE_COUNT};
use crate::config::VectorizerConfig;
use crate::model::ModelError;
use crate::parser::ParsedLogRecord;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-column mean and scale fitted on one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    /// Population standard deviation; 1.0 for constant columns so they map to 0.
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(matrix: &Array2<f64>) -> Self {
        let width = matrix.ncols();
        if matrix.nrows() == 0 {
            return Self {
                mean: Array1::zeros(width),
                scale: Array1::ones(width),
            };
        }
        let mean = matrix.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(width));
        let scale = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > f64::EPSILON { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if matrix.ncols() != self.width() {
            return Err(ModelError::ShapeMismatch {
                expected: self.width(),
                actual: matrix.ncols(),
            });
        }
        Ok((matrix - &self.mean) / &self.scale)
    }
}

/// Output of fitting the feature pipeline on a batch.
#[derive(Debug, Clone)]
pub struct ComposedBatch {
    pub rows: Vec<FeatureRow>,
    /// Standardized, `rows.len()` x (12 + vocabulary size).
    pub matrix: Array2<f64>,
    pub vectorizer: FittedVectorizer,
    pub standardizer: Standardizer,
    pub degraded: Option<Degraded>,
}

pub struct FeatureComposer {
    vectorizer: TfidfVectorizer,
}

impl FeatureComposer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self {
            vectorizer: TfidfVectorizer::new(config),
        }
    }

    /// Fit vectorizer and standardizer on `records` and return the standardized matrix.
    pub fn fit_compose(&self, records: &[ParsedLogRecord]) -> ComposedBatch {
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        let (vectorizer, degraded) = self.vectorizer.fit(&messages);
        if let Some(reason) = degraded {
            warn!(rows = records.len(), %reason, "text vectorization degraded; using structural features only");
        }

        let rows = feature_rows(records, &vectorizer);
        let raw = assemble_matrix(&rows, vectorizer.width());
        let standardizer = Standardizer::fit(&raw);
        let matrix = (&raw - &standardizer.mean) / &standardizer.scale;
        debug!(rows = rows.len(), columns = matrix.ncols(), "feature matrix composed");

        ComposedBatch {
            rows,
            matrix,
            vectorizer,
            standardizer,
            degraded,
        }
    }
}

/// Structural features plus text vectors from an already-fitted vectorizer.
pub fn feature_rows(records: &[ParsedLogRecord], vectorizer: &FittedVectorizer) -> Vec<FeatureRow> {
    let structural = StructuralFeatures::from_batch(records);
    let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
    let text = vectorizer.transform(&messages);
    records
        .iter()
        .zip(structural)
        .zip(text.rows())
        .map(|((r, s), t)| FeatureRow {
            record_id: r.id,
            structural: s,
            text_vector: t.to_vec(),
        })
        .collect()
}

/// Concatenate rows into one matrix; non-finite cells become 0.
pub fn assemble_matrix(rows: &[FeatureRow], text_width: usize) -> Array2<f64> {
    let width = STRUCTURAL_FEATURE_COUNT + text_width;
    let mut out = Array2::zeros((rows.len(), width));
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row.to_vector().into_iter().take(width).enumerate() {
            out[[i, j]] = if v.is_finite() { v } else { 0.0 };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogLevel;

    fn record(id: i64, message: &str) -> ParsedLogRecord {
        ParsedLogRecord {
            id,
            file_name: "a.log".into(),
            log_level: LogLevel::Info,
            message: message.into(),
            timestamp_extracted: None,
        }
    }

    #[test]
    fn structural_only_batch_is_twelve_wide() {
        let records: Vec<_> = (0..5).map(|i| record(i, &format!("{i}"))).collect();
        let batch = FeatureComposer::new(VectorizerConfig::default()).fit_compose(&records);
        assert!(batch.degraded.is_some());
        assert_eq!(batch.matrix.dim(), (5, STRUCTURAL_FEATURE_COUNT));
        assert_eq!(batch.rows.len(), 5);
        assert!(batch.rows.iter().all(|r| r.text_vector.is_empty()));
    }

    #[test]
    fn standardized_columns_have_zero_mean_unit_variance() {
        let m = ndarray::array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [6.0, 5.0]];
        let s = Standardizer::fit(&m);
        let z = s.transform(&m).unwrap();
        let mean = z.mean_axis(Axis(0)).unwrap();
        let std = z.std_axis(Axis(0), 0.0);
        assert!(mean[0].abs() < 1e-12);
        assert!((std[0] - 1.0).abs() < 1e-12);
        // Constant column maps to 0.
        assert!(z.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn transform_rejects_wrong_width() {
        let s = Standardizer::fit(&Array2::zeros((3, 4)));
        let err = s.transform(&Array2::zeros((3, 5))).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { expected: 4, actual: 5 }));
    }

    #[test]
    fn assemble_replaces_non_finite_values() {
        let rows = vec![FeatureRow {
            record_id: 1,
            structural: StructuralFeatures::default(),
            text_vector: vec![f64::NAN, 0.5],
        }];
        let m = assemble_matrix(&rows, 2);
        assert_eq!(m.ncols(), 14);
        assert_eq!(m[[0, 12]], 0.0);
        assert_eq!(m[[0, 13]], 0.5);
    }

    #[test]
    fn text_columns_follow_structural_columns() {
        let records = vec![
            record(1, "disk full on volume"),
            record(2, "disk full on volume"),
            record(3, "network down again"),
            record(4, "network down again"),
            record(5, "heartbeat"),
        ];
        let batch = FeatureComposer::new(VectorizerConfig::default()).fit_compose(&records);
        assert!(batch.degraded.is_none());
        assert_eq!(batch.matrix.ncols(), STRUCTURAL_FEATURE_COUNT + batch.vectorizer.width());
        assert_eq!(batch.standardizer.width(), batch.matrix.ncols());
    }
}

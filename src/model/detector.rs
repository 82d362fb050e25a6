//! Fit and transform-only scoring over parsed records.

use super::forest::{contamination_threshold, IsolationForest};
use super::ModelError;
use crate::config::{ScorerConfig, VectorizerConfig};
use crate::features::{
    assemble_matrix, feature_rows, ComposedBatch, Degraded, FeatureComposer, FeatureRow, FittedVectorizer,
    Standardizer, STRUCTURAL_FEATURE_COUNT,
};
use crate::parser::ParsedLogRecord;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Label for rows scored as anomalous.
pub const ANOMALY: i8 = -1;
/// Label for rows scored as normal.
pub const NORMAL: i8 = 1;

/// Per-row labels (`-1` anomalous, `1` normal) and the continuous measure they
/// were cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub labels: Vec<i8>,
    pub probabilities: Vec<f64>,
}

impl Predictions {
    fn from_scores(probabilities: Vec<f64>, threshold: f64) -> Self {
        let labels = probabilities
            .iter()
            .map(|&p| if p > threshold { ANOMALY } else { NORMAL })
            .collect();
        Self {
            labels,
            probabilities,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_anomaly(&self, row: usize) -> bool {
        self.labels.get(row) == Some(&ANOMALY)
    }

    pub fn anomaly_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == ANOMALY).count()
    }
}

/// Features and predictions for one batch.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub rows: Vec<FeatureRow>,
    pub predictions: Predictions,
    pub degraded: Option<Degraded>,
}

/// Everything needed to score new records without refitting. Immutable once
/// built; pass it explicitly to [`FittedModel::score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub(super) vectorizer: FittedVectorizer,
    pub(super) standardizer: Standardizer,
    pub(super) forest: IsolationForest,
    pub(super) contamination: f64,
    pub(super) threshold: f64,
}

impl FittedModel {
    /// Fit vectorizer, standardizer and forest on `records` and score them.
    pub fn fit(
        records: &[ParsedLogRecord],
        vectorizer: &VectorizerConfig,
        scorer: &ScorerConfig,
    ) -> Result<(Self, ScoredBatch), ModelError> {
        let composed = FeatureComposer::new(vectorizer.clone()).fit_compose(records);
        Self::fit_composed(composed, scorer)
    }

    /// Fit the forest on an already composed batch.
    pub fn fit_composed(composed: ComposedBatch, scorer: &ScorerConfig) -> Result<(Self, ScoredBatch), ModelError> {
        let (forest, threshold, predictions) = fit_predict(composed.matrix.view(), scorer)?;
        info!(
            rows = predictions.len(),
            columns = composed.matrix.ncols(),
            trees = forest.n_trees(),
            anomalies = predictions.anomaly_count(),
            "isolation forest fitted"
        );
        let model = Self {
            vectorizer: composed.vectorizer,
            standardizer: composed.standardizer,
            forest,
            contamination: scorer.contamination,
            threshold,
        };
        let batch = ScoredBatch {
            rows: composed.rows,
            predictions,
            degraded: composed.degraded,
        };
        Ok((model, batch))
    }

    /// Transform-only scoring with the fitted vocabulary, statistics and
    /// threshold. Message frequencies are still counted over `records`.
    pub fn score(&self, records: &[ParsedLogRecord]) -> Result<ScoredBatch, ModelError> {
        let (rows, matrix) = self.compose(records)?;
        self.score_composed(rows, matrix.view())
    }

    /// Feature rows and the standardized matrix, without scoring.
    pub fn compose(&self, records: &[ParsedLogRecord]) -> Result<(Vec<FeatureRow>, Array2<f64>), ModelError> {
        let rows = feature_rows(records, &self.vectorizer);
        let raw = assemble_matrix(&rows, self.vectorizer.width());
        let matrix = self.standardizer.transform(&raw)?;
        Ok((rows, matrix))
    }

    /// Score a matrix produced by [`FittedModel::compose`].
    pub fn score_composed(&self, rows: Vec<FeatureRow>, matrix: ArrayView2<f64>) -> Result<ScoredBatch, ModelError> {
        let probabilities = self.forest.score_samples(matrix)?;
        let predictions = Predictions::from_scores(probabilities, self.threshold);
        debug!(rows = rows.len(), anomalies = predictions.anomaly_count(), "scored with fitted model");
        Ok(ScoredBatch {
            rows,
            predictions,
            degraded: None,
        })
    }

    /// Columns the model expects: 12 structural plus the vocabulary.
    pub fn n_features(&self) -> usize {
        self.forest.n_features()
    }

    pub fn vocabulary(&self) -> &[String] {
        self.vectorizer.vocabulary()
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Components agree on width. Checked after loading from disk.
    pub(super) fn check_consistency(&self) -> Result<(), ModelError> {
        let expected = STRUCTURAL_FEATURE_COUNT + self.vectorizer.width();
        for actual in [self.standardizer.width(), self.forest.n_features()] {
            if actual != expected {
                return Err(ModelError::ShapeMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Fit a forest on a standardized matrix and label roughly `contamination` of
/// its rows anomalous. Returns the forest and the cut-off it used.
pub fn fit_predict(
    matrix: ArrayView2<f64>,
    scorer: &ScorerConfig,
) -> Result<(IsolationForest, f64, Predictions), ModelError> {
    let forest = IsolationForest::fit(matrix, scorer);
    let probabilities = forest.score_samples(matrix)?;
    let threshold = contamination_threshold(&probabilities, scorer.contamination);
    Ok((forest, threshold, Predictions::from_scores(probabilities, threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogLevel;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn record(id: i64, level: LogLevel, message: &str) -> ParsedLogRecord {
        ParsedLogRecord {
            id,
            file_name: "t.log".into(),
            log_level: level,
            message: message.into(),
            timestamp_extracted: None,
        }
    }

    fn noisy_batch() -> Vec<ParsedLogRecord> {
        let mut out: Vec<_> = (0..40)
            .map(|i| record(i, LogLevel::Info, &format!("request served in {} ms", i % 5)))
            .collect();
        out.push(record(40, LogLevel::Critical, "Unauthorized access attempt: kernel exception!!! [0xdead]"));
        out
    }

    #[test]
    fn labels_agree_with_flags() {
        let (_, batch) = FittedModel::fit(&noisy_batch(), &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        for (i, label) in batch.predictions.labels.iter().enumerate() {
            assert!(*label == ANOMALY || *label == NORMAL);
            assert_eq!(batch.predictions.is_anomaly(i), *label == ANOMALY);
        }
        assert!(batch.predictions.is_anomaly(40));
    }

    #[test]
    fn contamination_controls_anomaly_share() {
        let mut rng = StdRng::seed_from_u64(1);
        let data = Array2::from_shape_fn((1000, 4), |_| rng.gen::<f64>());
        let (_, _, predictions) = fit_predict(data.view(), &ScorerConfig::default()).unwrap();
        let share = predictions.anomaly_count() as f64 / 1000.0;
        assert!((share - 0.1).abs() <= 0.02, "anomaly share {share}");
    }

    #[test]
    fn fit_is_deterministic() {
        let records = noisy_batch();
        let (a, ba) = FittedModel::fit(&records, &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        let (b, bb) = FittedModel::fit(&records, &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(ba.predictions, bb.predictions);
    }

    #[test]
    fn transform_only_matches_fit_on_same_batch() {
        let records = noisy_batch();
        let (model, fitted) = FittedModel::fit(&records, &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        let rescored = model.score(&records).unwrap();
        assert_eq!(rescored.predictions.labels, fitted.predictions.labels);
        for (a, b) in rescored.predictions.probabilities.iter().zip(&fitted.predictions.probabilities) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_batches_are_all_normal() {
        let one = vec![record(1, LogLevel::Error, "lonely line")];
        let (_, batch) = FittedModel::fit(&one, &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        assert_eq!(batch.predictions.labels, vec![NORMAL]);
        assert_eq!(batch.predictions.probabilities, vec![0.5]);

        let same: Vec<_> = (0..6).map(|i| record(i, LogLevel::Info, "same")).collect();
        let (_, batch) = FittedModel::fit(&same, &VectorizerConfig::default(), &ScorerConfig::default()).unwrap();
        assert_eq!(batch.predictions.anomaly_count(), 0);
        assert_eq!(batch.predictions.len(), 6);
    }
}

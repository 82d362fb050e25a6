//! Isolation forest: randomized recursive partitioning, anomalies isolate in
//! fewer splits.
//!
//! Liu, Ting & Zhou (2008), "Isolation Forest".

use super::ModelError;
use crate::config::ScorerConfig;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SAMPLES: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
/// Score of a row the forest cannot tell apart from the rest.
const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum IsolationNode {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Rows left unresolved when splitting stopped.
    Leaf { size: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    fn build(data: &ArrayView2<f64>, rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn path_length(&self, sample: &ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                    depth += 1;
                }
                IsolationNode::Leaf { size } => return depth as f64 + average_path_length(*size),
            }
        }
    }
}

fn build_node(
    data: &ArrayView2<f64>,
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> IsolationNode {
    if depth >= max_depth || rows.len() <= 1 {
        return IsolationNode::Leaf { size: rows.len() };
    }

    // Only features that still vary within this node can split it.
    let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
    for feature in 0..data.ncols() {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &r in &rows {
            let v = data[[r, feature]];
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if hi > lo {
            candidates.push((feature, lo, hi));
        }
    }
    if candidates.is_empty() {
        return IsolationNode::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    // threshold in [lo, hi): the min row always goes left, the max row right.
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&r| data[[r, feature]] <= threshold);

    IsolationNode::Internal {
        feature,
        threshold,
        left: Box::new(build_node(data, left, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, right, depth + 1, max_depth, rng)),
    }
}

/// Expected path length of an unsuccessful BST search over `n` rows.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Fit on `data` (rows = samples). Each tree gets its own seed derived from
    /// `config.seed`, so parallel building yields the same forest every time.
    pub fn fit(data: ArrayView2<f64>, config: &ScorerConfig) -> Self {
        let n_rows = data.nrows();
        let subsample_size = config
            .max_samples
            .unwrap_or(DEFAULT_MAX_SAMPLES)
            .min(n_rows)
            .max(1);
        let max_depth = (subsample_size.max(2) as f64).log2().ceil() as usize;

        let mut master = StdRng::seed_from_u64(config.seed);
        let seeds: Vec<u64> = (0..config.n_estimators).map(|_| master.gen()).collect();

        let trees = if n_rows == 0 {
            Vec::new()
        } else {
            seeds
                .par_iter()
                .map(|&seed| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let rows = rand::seq::index::sample(&mut rng, n_rows, subsample_size).into_vec();
                    IsolationTree::build(&data, rows, max_depth, &mut rng)
                })
                .collect()
        };

        Self {
            trees,
            subsample_size,
            n_features: data.ncols(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Anomaly measure per row, `2^(-E[h] / c(subsample))`: higher is more
    /// anomalous, ~0.5 for unremarkable rows. Not a calibrated probability.
    pub fn score_samples(&self, data: ArrayView2<f64>) -> Result<Vec<f64>, ModelError> {
        if data.ncols() != self.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: self.n_features,
                actual: data.ncols(),
            });
        }
        let norm = average_path_length(self.subsample_size);
        if self.trees.is_empty() || norm <= 0.0 {
            return Ok(vec![NEUTRAL_SCORE; data.nrows()]);
        }
        let n_trees = self.trees.len() as f64;
        Ok(data
            .outer_iter()
            .map(|row| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(&row)).sum::<f64>() / n_trees;
                2f64.powf(-mean_depth / norm)
            })
            .collect())
    }
}

/// Score above which roughly `contamination` of `scores` lie (linear-interpolated
/// percentile). With no scores, the neutral 0.5.
pub fn contamination_threshold(scores: &[f64], contamination: f64) -> f64 {
    if scores.is_empty() {
        return NEUTRAL_SCORE;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (1.0 - contamination).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn config(seed: u64) -> ScorerConfig {
        ScorerConfig {
            seed,
            ..ScorerConfig::default()
        }
    }

    #[test]
    fn average_path_length_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.2448).abs() < 1e-3, "c(256) = {c256}");
    }

    #[test]
    fn outlier_scores_highest() {
        let data = array![
            [1.0, 2.0],
            [1.1, 2.1],
            [0.9, 1.9],
            [1.2, 2.2],
            [1.0, 2.1],
            [0.95, 2.05],
            [10.0, 20.0],
        ];
        let forest = IsolationForest::fit(data.view(), &config(42));
        let scores = forest.score_samples(data.view()).unwrap();
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, 6);
    }

    #[test]
    fn same_seed_same_forest() {
        let data = Array2::from_shape_fn((60, 3), |(i, j)| ((i * 7 + j * 13) % 17) as f64);
        let a = IsolationForest::fit(data.view(), &config(7));
        let b = IsolationForest::fit(data.view(), &config(7));
        assert_eq!(a, b);
        assert_eq!(a.score_samples(data.view()).unwrap(), b.score_samples(data.view()).unwrap());
    }

    #[test]
    fn identical_rows_score_one_half() {
        let data = Array2::from_elem((10, 4), 3.0);
        let forest = IsolationForest::fit(data.view(), &config(42));
        let scores = forest.score_samples(data.view()).unwrap();
        assert!(scores.iter().all(|s| (s - 0.5).abs() < 1e-12));
    }

    #[test]
    fn single_row_scores_one_half() {
        let data = array![[1.0, 2.0, 3.0]];
        let forest = IsolationForest::fit(data.view(), &config(42));
        assert_eq!(forest.score_samples(data.view()).unwrap(), vec![0.5]);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let data = Array2::<f64>::zeros((5, 3));
        let forest = IsolationForest::fit(data.view(), &config(42));
        let err = forest.score_samples(Array2::zeros((2, 4)).view()).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { expected: 3, actual: 4 }));
    }

    #[test]
    fn threshold_interpolates() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert!((contamination_threshold(&scores, 0.25) - 0.4).abs() < 1e-12);
        assert!((contamination_threshold(&scores, 0.1) - 0.46).abs() < 1e-12);
        assert_eq!(contamination_threshold(&[], 0.1), 0.5);
    }
}

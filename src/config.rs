//! Analyzer configuration. Loaded from JSON; every section has defaults.

use crate::features::TermRanking;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("contamination must be in (0, 1), got {0}")]
    Contamination(f64),
    #[error("n_estimators must be at least 1")]
    NoEstimators,
    #[error("max_features must be at least 1")]
    NoFeatures,
    #[error("max_df must be in (0, 1], got {0}")]
    MaxDf(f64),
    #[error("min_df must be at least 1")]
    MinDf,
    #[error("ngram_max must be at least 1")]
    NgramMax,
    #[error("config {path:?} unusable: {detail}")]
    Unreadable { path: PathBuf, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Data directory (SQLite store, default model dir)
    pub data_dir: PathBuf,
    /// Where `analyze --save-model` writes and `score` reads; defaults to `<data_dir>/models`
    pub model_dir: Option<PathBuf>,
    /// TF-IDF parameters
    pub vectorizer: VectorizerConfig,
    /// Isolation forest parameters
    pub scorer: ScorerConfig,
    /// File ingestion
    pub ingest: IngestConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Upper bound on text columns
    pub max_features: usize,
    /// Minimum number of messages a term must occur in
    pub min_df: u32,
    /// Maximum share of messages a term may occur in
    pub max_df: f64,
    /// Longest n-gram (1 = unigrams only)
    pub ngram_max: usize,
    pub ranking: TermRanking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Expected share of anomalous lines
    pub contamination: f64,
    pub n_estimators: usize,
    /// Rows drawn per tree; `None` = min(256, batch size)
    pub max_samples: Option<usize>,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// File extensions picked up when walking a directory
    pub extensions: Vec<String>,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".logsift"),
            model_dir: None,
            vectorizer: VectorizerConfig::default(),
            scorer: ScorerConfig::default(),
            ingest: IngestConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: 100,
            min_df: 2,
            max_df: 0.8,
            ngram_max: 2,
            ranking: TermRanking::CorpusFrequency,
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: None,
            seed: 42,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["log".to_string(), "txt".to_string()],
            max_depth: 4,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AnalyzerConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    /// Like [`AnalyzerConfig::load`], but a file that exists and cannot be
    /// read or parsed is an error instead of silently becoming the default.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let unreadable = |detail: String| ConfigError::Unreadable {
            path: path.to_path_buf(),
            detail,
        };
        let data = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| unreadable(e.to_string()))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("logsift.db")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("models"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vectorizer.validate()?;
        self.scorer.validate()
    }
}

impl VectorizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_features == 0 {
            return Err(ConfigError::NoFeatures);
        }
        if self.min_df == 0 {
            return Err(ConfigError::MinDf);
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(ConfigError::MaxDf(self.max_df));
        }
        if self.ngram_max == 0 {
            return Err(ConfigError::NgramMax);
        }
        Ok(())
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            return Err(ConfigError::Contamination(self.contamination));
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::NoEstimators);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let c: AnalyzerConfig =
            serde_json::from_str(r#"{"scorer": {"contamination": 0.05}, "vectorizer": {"ranking": "tfidf_weight"}}"#)
                .unwrap();
        assert_eq!(c.scorer.contamination, 0.05);
        assert_eq!(c.scorer.n_estimators, 100);
        assert_eq!(c.scorer.seed, 42);
        assert_eq!(c.vectorizer.ranking, TermRanking::TfidfWeight);
        assert_eq!(c.vectorizer.max_features, 100);
        assert_eq!(c.model_dir(), PathBuf::from(".logsift").join("models"));
    }

    #[test]
    fn broken_file_is_an_error_for_try_load_and_default_for_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"scorer\": ").unwrap();

        let err = AnalyzerConfig::try_load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { path: ref p, .. } if *p == path));
        assert_eq!(AnalyzerConfig::load(&path).scorer.contamination, 0.1);

        let missing = AnalyzerConfig::try_load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing.vectorizer.max_features, 100);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut c = AnalyzerConfig::default();
        assert!(c.validate().is_ok());
        c.scorer.contamination = 1.0;
        assert_eq!(c.validate(), Err(ConfigError::Contamination(1.0)));
        c.scorer.contamination = 0.1;
        c.vectorizer.max_df = 0.0;
        assert_eq!(c.validate(), Err(ConfigError::MaxDf(0.0)));
        c.vectorizer.max_df = 0.8;
        c.scorer.n_estimators = 0;
        assert_eq!(c.validate(), Err(ConfigError::NoEstimators));
    }
}

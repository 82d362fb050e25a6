//! On-disk form of a [`FittedModel`]: one JSON file per component plus a
//! manifest of SHA-256 digests checked on load.

use super::{FittedModel, IsolationForest, ModelError};
use crate::features::{FittedVectorizer, Standardizer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";
const VECTORIZER_FILE: &str = "tfidf_vectorizer.json";
const SCALER_FILE: &str = "scaler.json";
const FOREST_FILE: &str = "isolation_forest.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: u32,
    pub n_features: usize,
    pub vocabulary_size: usize,
    pub contamination: f64,
    pub threshold: f64,
    pub created_at: DateTime<Utc>,
    /// file name → hex SHA-256
    pub digests: BTreeMap<String, String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl FittedModel {
    /// Write every component into `dir` (created if missing).
    pub fn save(&self, dir: &Path) -> Result<ModelManifest, ModelError> {
        std::fs::create_dir_all(dir)?;
        let artifacts = [
            (VECTORIZER_FILE, serde_json::to_vec(&self.vectorizer)?),
            (SCALER_FILE, serde_json::to_vec(&self.standardizer)?),
            (FOREST_FILE, serde_json::to_vec(&self.forest)?),
        ];

        let mut digests = BTreeMap::new();
        for (name, bytes) in &artifacts {
            std::fs::write(dir.join(name), bytes)?;
            digests.insert(name.to_string(), sha256_hex(bytes));
        }

        let manifest = ModelManifest {
            version: FORMAT_VERSION,
            n_features: self.n_features(),
            vocabulary_size: self.vectorizer.width(),
            contamination: self.contamination,
            threshold: self.threshold,
            created_at: Utc::now(),
            digests,
        };
        std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
        info!(dir = %dir.display(), n_features = manifest.n_features, "model saved");
        Ok(manifest)
    }

    /// Restore a model written by [`FittedModel::save`], verifying digests and
    /// that all components agree on the feature width.
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let manifest: ModelManifest = serde_json::from_slice(&std::fs::read(dir.join(MANIFEST_FILE))?)?;

        let read_verified = |name: &str| -> Result<Vec<u8>, ModelError> {
            let expected = manifest
                .digests
                .get(name)
                .ok_or_else(|| ModelError::MissingArtifact { file: name.to_string() })?;
            let bytes = std::fs::read(dir.join(name))?;
            if &sha256_hex(&bytes) != expected {
                return Err(ModelError::DigestMismatch { file: name.to_string() });
            }
            Ok(bytes)
        };

        let vectorizer: FittedVectorizer = serde_json::from_slice(&read_verified(VECTORIZER_FILE)?)?;
        let standardizer: Standardizer = serde_json::from_slice(&read_verified(SCALER_FILE)?)?;
        let forest: IsolationForest = serde_json::from_slice(&read_verified(FOREST_FILE)?)?;

        let model = FittedModel {
            vectorizer,
            standardizer,
            forest,
            contamination: manifest.contamination,
            threshold: manifest.threshold,
        };
        model.check_consistency()?;
        if model.n_features() != manifest.n_features {
            return Err(ModelError::ShapeMismatch {
                expected: manifest.n_features,
                actual: model.n_features(),
            });
        }
        info!(dir = %dir.display(), n_features = model.n_features(), "model loaded");
        Ok(model)
    }
}

//! TF-IDF vectorization of log messages.
//!
//! Tokens are lowercased, accent-stripped alphabetic runs of two or more
//! letters with English stop words removed; unigrams through `ngram_max`-grams
//! are counted. The fitted vocabulary is sorted, which fixes column order.

use super::stopwords::is_stop_word;
use crate::config::VectorizerConfig;
use fancy_regex::Regex;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{2,}\b").expect("valid regex literal"));

/// How terms compete for the `max_features` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermRanking {
    /// Total occurrences across the batch.
    CorpusFrequency,
    /// Total occurrences weighted by idf.
    TfidfWeight,
}

impl Default for TermRanking {
    fn default() -> Self {
        TermRanking::CorpusFrequency
    }
}

/// Why a fit produced no vocabulary. The pipeline continues with structural
/// features only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degraded {
    /// No message contained a usable token.
    NoTokens,
    /// `max_df` admits fewer documents than `min_df` requires.
    ThresholdConflict { min_docs: u32, max_docs: f64 },
    /// Every term fell outside the document-frequency window.
    AllPruned { candidates: usize },
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degraded::NoTokens => write!(f, "empty vocabulary; messages contain no usable tokens"),
            Degraded::ThresholdConflict { min_docs, max_docs } => write!(
                f,
                "max_df admits {max_docs:.1} documents, fewer than min_df={min_docs}"
            ),
            Degraded::AllPruned { candidates } => write!(
                f,
                "after pruning, no terms remain ({candidates} candidates outside the document-frequency window)"
            ),
        }
    }
}

/// Unfitted vectorizer parameters.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
}

impl TfidfVectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }

    /// Learn vocabulary and idf weights from `messages`.
    pub fn fit<S: AsRef<str>>(&self, messages: &[S]) -> (FittedVectorizer, Option<Degraded>) {
        let n_docs = messages.len();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut corpus_freq: HashMap<String, u64> = HashMap::new();

        for msg in messages {
            let terms = analyze(msg.as_ref(), self.config.ngram_max);
            let mut seen: HashSet<&str> = HashSet::new();
            for term in &terms {
                *corpus_freq.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }

        let empty = FittedVectorizer::empty();
        if doc_freq.is_empty() {
            return (empty, Some(Degraded::NoTokens));
        }

        let min_docs = self.config.min_df;
        let max_docs = self.config.max_df * n_docs as f64;
        if max_docs < min_docs as f64 {
            return (empty, Some(Degraded::ThresholdConflict { min_docs, max_docs }));
        }

        let mut kept: Vec<(String, u32)> = doc_freq
            .iter()
            .filter(|(_, df)| **df >= min_docs && **df as f64 <= max_docs)
            .map(|(t, &df)| (t.clone(), df))
            .collect();
        if kept.is_empty() {
            return (
                empty,
                Some(Degraded::AllPruned {
                    candidates: doc_freq.len(),
                }),
            );
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        if kept.len() > self.config.max_features {
            let rank = |term: &str, df: u32| -> f64 {
                let count = corpus_freq.get(term).copied().unwrap_or(0) as f64;
                match self.config.ranking {
                    TermRanking::CorpusFrequency => count,
                    TermRanking::TfidfWeight => count * smooth_idf(n_docs, df),
                }
            };
            // Stable sort keeps alphabetical order among ties.
            kept.sort_by(|a, b| {
                rank(&b.0, b.1)
                    .partial_cmp(&rank(&a.0, a.1))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            kept.truncate(self.config.max_features);
            kept.sort_by(|a, b| a.0.cmp(&b.0));
        }

        let idf = kept.iter().map(|(_, df)| smooth_idf(n_docs, *df)).collect();
        let vocabulary = kept.into_iter().map(|(t, _)| t).collect();
        (
            FittedVectorizer {
                vocabulary,
                idf,
                ngram_max: self.config.ngram_max,
            },
            None,
        )
    }

    pub fn fit_transform<S: AsRef<str>>(
        &self,
        messages: &[S],
    ) -> (FittedVectorizer, Array2<f64>, Option<Degraded>) {
        let (fitted, degraded) = self.fit(messages);
        let matrix = fitted.transform(messages);
        (fitted, matrix, degraded)
    }
}

/// Vocabulary and idf weights from one fit. Transform-only: never refits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedVectorizer {
    /// Sorted; position is the output column.
    vocabulary: Vec<String>,
    idf: Vec<f64>,
    ngram_max: usize,
}

impl FittedVectorizer {
    fn empty() -> Self {
        Self {
            vocabulary: Vec::new(),
            idf: Vec::new(),
            ngram_max: 1,
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn width(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    fn column(&self, term: &str) -> Option<usize> {
        self.vocabulary
            .binary_search_by(|t| t.as_str().cmp(term))
            .ok()
    }

    /// Rows are L2-normalized tf * idf; unknown terms are ignored.
    pub fn transform<S: AsRef<str>>(&self, messages: &[S]) -> Array2<f64> {
        let mut out = Array2::zeros((messages.len(), self.width()));
        if self.is_empty() {
            return out;
        }
        for (i, msg) in messages.iter().enumerate() {
            let mut row = out.row_mut(i);
            for term in analyze(msg.as_ref(), self.ngram_max) {
                if let Some(j) = self.column(&term) {
                    row[j] += 1.0;
                }
            }
            for (j, v) in row.iter_mut().enumerate() {
                *v *= self.idf[j];
            }
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        out
    }
}

fn smooth_idf(n_docs: usize, df: u32) -> f64 {
    ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0
}

/// Lowercase, strip accents, tokenize, drop stop words, emit n-grams.
fn analyze(doc: &str, ngram_max: usize) -> Vec<String> {
    let folded: String = doc
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let tokens: Vec<&str> = TOKEN
        .find_iter(&folded)
        .filter_map(Result::ok)
        .map(|m| m.as_str())
        .filter(|t| !is_stop_word(t))
        .collect();

    let mut terms = Vec::with_capacity(tokens.len() * ngram_max.max(1));
    for n in 1..=ngram_max.max(1) {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            terms.push(window.join(" "));
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectorizer(max_features: usize) -> TfidfVectorizer {
        TfidfVectorizer::new(VectorizerConfig {
            max_features,
            ..VectorizerConfig::default()
        })
    }

    #[test]
    fn analyze_strips_accents_stop_words_and_digits() {
        let terms = analyze("The Café failed after 30s on user123", 2);
        assert_eq!(terms, vec!["cafe", "failed", "cafe failed"]);
    }

    #[test]
    fn document_frequency_window_filters_terms() {
        let docs = [
            "database timeout error",
            "database timeout error",
            "cache miss",
            "cache miss",
            "database ready",
        ];
        let (fitted, degraded) = vectorizer(100).fit(&docs);
        assert!(degraded.is_none());
        // "database" is in 3/5 = 60% docs -> kept; "ready" only once -> dropped.
        assert!(fitted.vocabulary().iter().any(|t| t == "database"));
        assert!(fitted.vocabulary().iter().any(|t| t == "cache miss"));
        assert!(!fitted.vocabulary().iter().any(|t| t == "ready"));
        let mut sorted = fitted.vocabulary().to_vec();
        sorted.sort();
        assert_eq!(sorted, fitted.vocabulary());
    }

    #[test]
    fn rows_are_unit_length_or_zero() {
        let docs = [
            "database timeout error",
            "database timeout error",
            "cache miss",
            "cache miss",
            "unrelated words here",
        ];
        let (_, m, _) = vectorizer(100).fit_transform(&docs);
        for (i, row) in m.rows().into_iter().enumerate() {
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            if i == 4 {
                assert_eq!(norm, 0.0);
            } else {
                assert!((norm - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn max_features_keeps_most_frequent_terms() {
        let docs = [
            "alpha beta", "alpha beta", "alpha gamma", "alpha gamma", "delta", "delta",
        ];
        let (fitted, _) = TfidfVectorizer::new(VectorizerConfig {
            max_features: 2,
            ngram_max: 1,
            ..VectorizerConfig::default()
        })
        .fit(&docs);
        // alpha=4 occurrences; beta, gamma, delta tie at 2 -> alphabetical tie-break picks beta.
        assert_eq!(fitted.vocabulary(), ["alpha", "beta"]);
    }

    #[test]
    fn tiny_batches_degrade_to_zero_width() {
        let (fitted, m, degraded) = vectorizer(100).fit_transform(&["only one line"]);
        assert!(fitted.is_empty());
        assert_eq!(m.dim(), (1, 0));
        assert!(degraded.is_some());

        let (_, degraded) = vectorizer(100).fit(&["123", "456", "!!!"]);
        assert_eq!(degraded, Some(Degraded::NoTokens));

        let (_, degraded) = vectorizer(100).fit(&["same words", "same words", "same words"]);
        assert!(matches!(degraded, Some(Degraded::AllPruned { .. })));
    }

    #[test]
    fn transform_only_preserves_columns() {
        let docs = ["disk full", "disk full", "net down", "net down", "ok"];
        let (fitted, _) = vectorizer(100).fit(&docs);
        let m = fitted.transform(&["net down disk", "brand new words"]);
        assert_eq!(m.ncols(), fitted.width());
        assert!(m.row(0).iter().any(|v| *v > 0.0));
        assert!(m.row(1).iter().all(|v| *v == 0.0));
    }
}

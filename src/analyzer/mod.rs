//! Pipeline orchestrator: load → parse → features → score → persist → record.
//!
//! Every run walks the same stages in order. A failure in any stage aborts the
//! run and reports which stage failed and how many rows it had reached.

use crate::config::{AnalyzerConfig, ScorerConfig, VectorizerConfig};
use crate::features::{Degraded, FeatureComposer, FeatureRow};
use crate::model::{FittedModel, ModelError, ScoredBatch};
use crate::parser::{LogLevel, ParsedLogRecord};
use crate::storage::{FileFilter, LogStore, RawLogRow, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    LoadingRaw,
    Parsing,
    ExtractingFeatures,
    Scoring,
    PersistingResults,
    RecordingRun,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::LoadingRaw => "LOADING_RAW",
            Stage::Parsing => "PARSING",
            Stage::ExtractingFeatures => "EXTRACTING_FEATURES",
            Stage::Scoring => "SCORING",
            Stage::PersistingResults => "PERSISTING_RESULTS",
            Stage::RecordingRun => "RECORDING_RUN",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One scored log line as handed to storage and report consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub record_id: i64,
    pub file_name: String,
    pub log_level: LogLevel,
    pub message: String,
    /// `-1` anomalous, `1` normal.
    pub anomaly_score: i8,
    /// Higher is more anomalous. Not a calibrated probability.
    pub anomaly_probability: f64,
    pub is_anomaly: bool,
}

/// Audit row, one per completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// File name, or "ALL" when unfiltered.
    pub file_name_filter: String,
    pub total_logs: usize,
    pub anomalies_detected: usize,
    pub contamination_factor: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FailureKind {
    #[error("input: {0}")]
    Input(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
#[error("run failed in {stage} after {processed} rows: {kind}")]
pub struct PipelineError {
    pub stage: Stage,
    pub processed: usize,
    pub kind: FailureKind,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub final_stage: Stage,
    /// `None` when the run stopped before recording (empty batch).
    pub summary: Option<RunSummary>,
    pub results: Vec<AnomalyResult>,
    pub features: Vec<FeatureRow>,
    /// Set on fitting runs; transform-only runs reuse the caller's model.
    pub model: Option<FittedModel>,
    pub degraded: Option<Degraded>,
}

impl RunOutcome {
    fn empty(run_id: String) -> Self {
        Self {
            run_id,
            final_stage: Stage::Failed,
            summary: None,
            results: Vec::new(),
            features: Vec::new(),
            model: None,
            degraded: None,
        }
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn anomaly_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_anomaly).count()
    }
}

/// Tracks the current stage and row count so failures carry context.
struct Progress {
    run_id: String,
    stage: Stage,
    processed: usize,
}

impl Progress {
    fn start(filter: &FileFilter) -> Self {
        let run_id = Uuid::new_v4().to_string();
        info!(%run_id, filter = %filter, stage = %Stage::LoadingRaw, "run started");
        Self {
            run_id,
            stage: Stage::LoadingRaw,
            processed: 0,
        }
    }

    fn advance(&mut self, stage: Stage, processed: usize) {
        self.stage = stage;
        self.processed = processed;
        info!(run_id = %self.run_id, stage = %stage, rows = processed, "stage");
    }

    fn fail(&self, kind: impl Into<FailureKind>) -> PipelineError {
        let err = PipelineError {
            stage: self.stage,
            processed: self.processed,
            kind: kind.into(),
        };
        warn!(run_id = %self.run_id, stage = %self.stage, rows = self.processed, error = %err.kind, "run failed");
        err
    }
}

/// Runs the pipeline against a [`LogStore`]. Holds no fitted state: each
/// [`Analyzer::run`] returns its own [`FittedModel`].
pub struct Analyzer<'a, S: LogStore + ?Sized> {
    store: &'a S,
    vectorizer: VectorizerConfig,
    scorer: ScorerConfig,
}

impl<'a, S: LogStore + ?Sized> Analyzer<'a, S> {
    pub fn new(store: &'a S, config: &AnalyzerConfig) -> Self {
        Self::with_settings(store, config.vectorizer.clone(), config.scorer.clone())
    }

    pub fn with_settings(store: &'a S, vectorizer: VectorizerConfig, scorer: ScorerConfig) -> Self {
        Self {
            store,
            vectorizer,
            scorer,
        }
    }

    /// Fit on the filtered batch and score it. An empty batch is not an
    /// error: the outcome ends in [`Stage::Failed`] with zero rows and no run
    /// record.
    pub fn run(&self, filter: &FileFilter) -> Result<RunOutcome, PipelineError> {
        let mut progress = Progress::start(filter);
        let Some(records) = self.load_and_parse(filter, &mut progress)? else {
            return Ok(RunOutcome::empty(progress.run_id));
        };

        progress.advance(Stage::ExtractingFeatures, records.len());
        let composed = FeatureComposer::new(self.vectorizer.clone()).fit_compose(&records);
        progress.advance(Stage::Scoring, records.len());
        let (model, batch) = FittedModel::fit_composed(composed, &self.scorer).map_err(|e| progress.fail(e))?;

        self.finish(progress, filter, &records, batch, self.scorer.contamination, Some(model))
    }

    /// Score the filtered batch with an already fitted model, without refitting.
    pub fn score_with(&self, model: &FittedModel, filter: &FileFilter) -> Result<RunOutcome, PipelineError> {
        let mut progress = Progress::start(filter);
        let Some(records) = self.load_and_parse(filter, &mut progress)? else {
            return Ok(RunOutcome::empty(progress.run_id));
        };

        progress.advance(Stage::ExtractingFeatures, records.len());
        let (rows, matrix) = model.compose(&records).map_err(|e| progress.fail(e))?;
        progress.advance(Stage::Scoring, records.len());
        let batch = model
            .score_composed(rows, matrix.view())
            .map_err(|e| progress.fail(e))?;

        self.finish(progress, filter, &records, batch, model.contamination(), None)
    }

    fn load_and_parse(
        &self,
        filter: &FileFilter,
        progress: &mut Progress,
    ) -> Result<Option<Vec<ParsedLogRecord>>, PipelineError> {
        let raw = self.store.load_raw(filter).map_err(|e| progress.fail(e))?;
        if raw.is_empty() {
            progress.advance(Stage::Failed, 0);
            warn!(run_id = %progress.run_id, filter = %filter, "no raw lines to analyze");
            return Ok(None);
        }

        progress.advance(Stage::Parsing, raw.len());
        let records = parse_rows(raw).map_err(|e| progress.fail(FailureKind::Input(e)))?;
        self.store.replace_parsed(&records).map_err(|e| progress.fail(e))?;
        Ok(Some(records))
    }

    fn finish(
        &self,
        mut progress: Progress,
        filter: &FileFilter,
        records: &[ParsedLogRecord],
        batch: ScoredBatch,
        contamination: f64,
        model: Option<FittedModel>,
    ) -> Result<RunOutcome, PipelineError> {
        let results = build_results(records, &batch);
        let anomalies = results.iter().filter(|r| r.is_anomaly).count();

        progress.advance(Stage::PersistingResults, results.len());
        self.store
            .append_results(&progress.run_id, &results)
            .map_err(|e| progress.fail(e))?;

        progress.advance(Stage::RecordingRun, results.len());
        let summary = RunSummary {
            run_id: progress.run_id.clone(),
            file_name_filter: filter.to_string(),
            total_logs: results.len(),
            anomalies_detected: anomalies,
            contamination_factor: contamination,
            timestamp: Utc::now(),
        };
        self.store.append_run(&summary).map_err(|e| progress.fail(e))?;

        progress.advance(Stage::Done, results.len());
        info!(
            run_id = %progress.run_id,
            total = summary.total_logs,
            anomalies,
            "run complete"
        );
        Ok(RunOutcome {
            run_id: progress.run_id,
            final_stage: Stage::Done,
            summary: Some(summary),
            results,
            features: batch.rows,
            model,
            degraded: batch.degraded,
        })
    }
}

/// Rows without a file name are rejected; a null line parses as empty.
fn parse_rows(raw: Vec<RawLogRow>) -> Result<Vec<ParsedLogRecord>, String> {
    raw.into_iter()
        .map(|row| {
            let file_name = row
                .file_name
                .filter(|f| !f.is_empty())
                .ok_or_else(|| format!("raw row {} has no file_name", row.log_id))?;
            Ok(ParsedLogRecord::from_raw(
                row.log_id,
                file_name,
                row.raw_text.as_deref().unwrap_or(""),
            ))
        })
        .collect()
}

fn build_results(records: &[ParsedLogRecord], batch: &ScoredBatch) -> Vec<AnomalyResult> {
    let p = &batch.predictions;
    records
        .iter()
        .zip(p.labels.iter().zip(&p.probabilities))
        .map(|(r, (&label, &probability))| AnomalyResult {
            record_id: r.id,
            file_name: r.file_name.clone(),
            log_level: r.log_level,
            message: r.message.clone(),
            anomaly_score: label,
            anomaly_probability: probability,
            is_anomaly: label == crate::model::ANOMALY,
        })
        .collect()
}

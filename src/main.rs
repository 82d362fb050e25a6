//! logsift entrypoint: ingest log files into the local store, analyze them,
//! and review flagged lines.

use clap::{Parser, Subcommand};
use logsift::{
    analyzer::{Analyzer, RunOutcome},
    config::AnalyzerConfig,
    explain::{AnomalyReport, ExplainEngine},
    ingest::LogCollector,
    logging::StructuredLogger,
    model::FittedModel,
    storage::{FileFilter, SqliteStore},
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(
    name = "logsift",
    about = "Unsupervised anomaly triage for log files",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read log files or directories into the store
    Ingest {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List ingested files with their line counts
    Files,

    /// Fit a model on stored lines and score them
    Analyze {
        /// Only analyze lines from this file
        #[arg(long)]
        file: Option<String>,

        /// Expected share of anomalous lines
        #[arg(long)]
        contamination: Option<f64>,

        /// Upper bound on TF-IDF columns
        #[arg(long)]
        max_features: Option<usize>,

        /// Seed for the isolation forest
        #[arg(long)]
        seed: Option<u64>,

        /// Save the fitted model to the model directory
        #[arg(long)]
        save_model: bool,

        /// Write results as NDJSON to this path
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Score stored lines with a saved model, without refitting
    Score {
        /// Model directory (defaults to the configured one)
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Only score lines from this file
        #[arg(long)]
        file: Option<String>,
    },

    /// Explain the most anomalous lines of a run
    Explain {
        /// Number of lines to explain
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Only flagged lines containing this keyword
        #[arg(long)]
        search: Option<String>,

        /// Run id (defaults to the latest run)
        #[arg(long)]
        run: Option<String>,
    },

    /// Show recent runs
    Runs {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let config_path = std::env::var("LOGSIFT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let (mut config, config_error) = match AnalyzerConfig::try_load(&config_path) {
        Ok(c) => (c, None),
        Err(e) => (AnalyzerConfig::default(), Some(e)),
    };

    StructuredLogger::init(config.log.json, &config.log.level);
    if let Some(e) = config_error {
        warn!(error = %e, "ignoring config file; using defaults");
    }
    info!(data_dir = ?config.data_dir, "logsift starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let store = SqliteStore::open(&config.db_path())?;

    match cli.command {
        Commands::Ingest { paths } => {
            let lines = LogCollector::new(&config.ingest).collect(&paths)?;
            let inserted = store.insert_raw(&lines)?;
            println!("Ingested {inserted} lines ({} total in store)", store.count_raw()?);
        }
        Commands::Files => {
            let files = store.list_files()?;
            if files.is_empty() {
                println!("No files ingested yet");
                return Ok(());
            }
            println!("{:<40} | Lines", "File");
            println!("{:-<40}-|-{:-<8}", "", "");
            for (name, lines) in files {
                println!("{name:<40} | {lines}");
            }
        }
        Commands::Analyze {
            file,
            contamination,
            max_features,
            seed,
            save_model,
            export,
        } => {
            if let Some(c) = contamination {
                config.scorer.contamination = c;
            }
            if let Some(k) = max_features {
                config.vectorizer.max_features = k;
            }
            if let Some(s) = seed {
                config.scorer.seed = s;
            }
            config.validate()?;

            let filter = FileFilter::from_option(file.as_deref());
            let outcome = Analyzer::new(&store, &config).run(&filter)?;
            print_outcome(&outcome);

            if save_model {
                if let Some(model) = &outcome.model {
                    let dir = config.model_dir();
                    let manifest = model.save(&dir)?;
                    println!("Model saved to {} ({} features)", dir.display(), manifest.n_features);
                }
            }
            if let Some(path) = export {
                let mut w = BufWriter::new(File::create(&path)?);
                let n = StructuredLogger::export_results(&outcome.run_id, &outcome.results, &mut w)?;
                println!("Exported {n} results to {}", path.display());
            }
        }
        Commands::Score { model_dir, file } => {
            let dir = model_dir.unwrap_or_else(|| config.model_dir());
            let model = FittedModel::load(&dir)?;
            let filter = FileFilter::from_option(file.as_deref());
            let outcome = Analyzer::new(&store, &config).score_with(&model, &filter)?;
            print_outcome(&outcome);
        }
        Commands::Explain { limit, search, run } => {
            let run_id = match run {
                Some(r) => r,
                None => match store.latest_run_id()? {
                    Some(r) => r,
                    None => {
                        println!("No runs recorded yet; run `logsift analyze` first");
                        return Ok(());
                    }
                },
            };
            let context = store.results(Some(&run_id))?;
            let flagged = match &search {
                Some(kw) => store.search_anomalies(Some(&run_id), kw, limit)?,
                None => store.top_anomalies(Some(&run_id), limit)?,
            };

            println!("Run {run_id}");
            print!("{}", AnomalyReport::from_results(&context));
            if flagged.is_empty() {
                println!("\nNo matching anomalies");
            }
            let engine = ExplainEngine::new(&context);
            for (i, r) in flagged.iter().enumerate() {
                println!(
                    "\n#{} [{}] {} (p={:.4}) {}",
                    i + 1,
                    r.log_level,
                    r.file_name,
                    r.anomaly_probability,
                    r.message
                );
                print!("{}", engine.explain(r));
            }
        }
        Commands::Runs { limit } => {
            println!(
                "{:<36} | {:<20} | {:>7} | {:>9} | {:>6} | Timestamp",
                "Run", "Filter", "Lines", "Anomalies", "Contam"
            );
            println!("{:-<36}-|-{:-<20}-|-{:-<7}-|-{:-<9}-|-{:-<6}-|-{:-<25}", "", "", "", "", "", "");
            for r in store.recent_runs(limit)? {
                println!(
                    "{:<36} | {:<20} | {:>7} | {:>9} | {:>6.3} | {}",
                    r.run_id,
                    r.file_name_filter,
                    r.total_logs,
                    r.anomalies_detected,
                    r.contamination_factor,
                    r.timestamp.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let Some(summary) = &outcome.summary else {
        println!("No log lines matched; nothing analyzed");
        return;
    };
    println!(
        "Run {}: {} lines, {} anomalies ({:.1}%)",
        summary.run_id,
        summary.total_logs,
        summary.anomalies_detected,
        summary.anomalies_detected as f64 / summary.total_logs.max(1) as f64 * 100.0
    );
    if let Some(reason) = &outcome.degraded {
        println!("Note: text features unavailable ({reason}); structural features only");
    }
}

//! JSON log lines: one JSON object per line (ndjson) for export and audit.

use crate::analyzer::AnomalyResult;
use serde::Serialize;
use std::io::{self, Write};
use tracing::Dispatch;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Export shape of one scored row, tagged with the run that produced it.
#[derive(Debug, Serialize)]
pub struct ResultEvent<'a> {
    pub run_id: &'a str,
    pub record_id: i64,
    pub file_name: &'a str,
    pub level: &'a str,
    pub message: &'a str,
    pub anomaly_score: i8,
    pub anomaly_probability: f64,
    pub is_anomaly: bool,
}

impl<'a> ResultEvent<'a> {
    pub fn new(run_id: &'a str, result: &'a AnomalyResult) -> Self {
        Self {
            run_id,
            record_id: result.record_id,
            file_name: &result.file_name,
            level: result.log_level.as_str(),
            message: &result.message,
            anomaly_score: result.anomaly_score,
            anomaly_probability: result.anomaly_probability,
            is_anomaly: result.is_anomaly,
        }
    }
}

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber on stderr. `RUST_LOG` overrides `default_level`.
    /// A second call is a no-op.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if Self::dispatch(json, filter, std::io::stderr).try_init().is_err() {
            tracing::debug!("subscriber already installed");
        }
    }

    /// The subscriber `init` installs, writing to `writer` instead of stderr.
    pub fn dispatch<W>(json: bool, filter: EnvFilter, writer: W) -> Dispatch
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(writer);
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt))
        } else {
            let fmt = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            Dispatch::new(tracing_subscriber::registry().with(filter).with(fmt))
        }
    }

    /// Write one event as a single JSON line, bypassing tracing.
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> io::Result<()> {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        writeln!(w, "{line}")
    }

    /// Every result of a run as NDJSON. Returns the number of lines written.
    pub fn export_results(run_id: &str, results: &[AnomalyResult], w: &mut impl Write) -> io::Result<usize> {
        for r in results {
            Self::emit_json(&ResultEvent::new(run_id, r), w)?;
        }
        w.flush()?;
        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogLevel;
    use std::sync::{Arc, Mutex};

    fn result(id: i64, anomalous: bool) -> AnomalyResult {
        AnomalyResult {
            record_id: id,
            file_name: "svc.log".into(),
            log_level: if anomalous { LogLevel::Error } else { LogLevel::Info },
            message: format!("message {id}"),
            anomaly_score: if anomalous { -1 } else { 1 },
            anomaly_probability: if anomalous { 0.71 } else { 0.42 },
            is_anomaly: anomalous,
        }
    }

    #[test]
    fn one_json_object_per_line() {
        let rows = vec![result(1, false), result(2, true)];
        let mut buf = Vec::new();
        let n = StructuredLogger::export_results("run-1", &rows, &mut buf).unwrap();
        assert_eq!(n, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["run_id"], "run-1");
        assert_eq!(second["record_id"], 2);
        assert_eq!(second["level"], "ERROR");
        assert_eq!(second["anomaly_score"], -1);
        assert_eq!(second["is_anomaly"], true);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn log_through(json: bool) -> String {
        let out = Captured::default();
        let sink = out.clone();
        let dispatch = StructuredLogger::dispatch(json, EnvFilter::new("warn"), move || sink.clone());
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("below the filter");
            tracing::warn!(rows = 3, "kept");
        });
        out.text()
    }

    #[test]
    fn json_subscriber_writes_one_object_per_event() {
        let text = log_through(true);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let event: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(event["level"], "WARN");
        assert_eq!(event["fields"]["message"], "kept");
        assert_eq!(event["fields"]["rows"], 3);
    }

    #[test]
    fn plain_subscriber_applies_level_filter() {
        let text = log_through(false);
        assert!(text.contains("kept"));
        assert!(text.contains("rows=3"));
        assert!(!text.contains("below the filter"));
    }
}

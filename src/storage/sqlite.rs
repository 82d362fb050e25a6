//! SQLite-backed store: raw_logs, parsed_logs, anomaly_results, anomaly_runs.

use super::{FileFilter, LogStore, RawLogRow, StoreError};
use crate::analyzer::{AnomalyResult, RunSummary};
use crate::ingest::RawLogLine;
use crate::parser::{LogLevel, ParsedLogRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS raw_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT,
    raw_line TEXT,
    ingested_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_raw_logs_file ON raw_logs(file_name);
CREATE TABLE IF NOT EXISTS parsed_logs (
    log_id INTEGER PRIMARY KEY,
    file_name TEXT NOT NULL,
    log_level TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp_extracted TEXT
);
CREATE TABLE IF NOT EXISTS anomaly_results (
    result_id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    log_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    log_level TEXT NOT NULL,
    message TEXT NOT NULL,
    anomaly_score INTEGER NOT NULL,
    anomaly_probability REAL NOT NULL,
    is_anomaly INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_results_run ON anomaly_results(run_id);
CREATE TABLE IF NOT EXISTS anomaly_runs (
    run_id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    total_logs INTEGER NOT NULL,
    anomalies_detected INTEGER NOT NULL,
    contamination_factor REAL NOT NULL,
    run_timestamp TEXT NOT NULL
);
"#;

const RESULT_COLUMNS: &str =
    "log_id, file_name, log_level, message, anomaly_score, anomaly_probability, is_anomaly";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Bulk-insert ingested lines in one transaction. Returns rows written.
    pub fn insert_raw(&self, lines: &[RawLogLine]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt =
                tx.prepare("INSERT INTO raw_logs (file_name, raw_line, ingested_at) VALUES (?1, ?2, ?3)")?;
            for line in lines {
                stmt.execute(params![line.file_name, line.raw_text, now])?;
            }
        }
        tx.commit()?;
        Ok(lines.len())
    }

    pub fn count_raw(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM raw_logs", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Distinct file names with their line counts.
    pub fn list_files(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name, COUNT(*) FROM raw_logs WHERE file_name IS NOT NULL GROUP BY file_name ORDER BY file_name",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn parsed(&self) -> Result<Vec<ParsedLogRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT log_id, file_name, log_level, message, timestamp_extracted FROM parsed_logs ORDER BY log_id",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, file_name, level, message, timestamp_extracted)| {
                Ok(ParsedLogRecord {
                    id,
                    file_name,
                    log_level: parse_level("parsed_logs", &level)?,
                    message,
                    timestamp_extracted,
                })
            })
            .collect()
    }

    /// Results of one run, or of every run when `run_id` is `None`.
    pub fn results(&self, run_id: Option<&str>) -> Result<Vec<AnomalyResult>, StoreError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM anomaly_results WHERE (?1 IS NULL OR run_id = ?1) ORDER BY result_id"
        );
        self.query_results(&sql, params![run_id])
    }

    /// Most anomalous flagged rows first.
    pub fn top_anomalies(&self, run_id: Option<&str>, limit: usize) -> Result<Vec<AnomalyResult>, StoreError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM anomaly_results
             WHERE is_anomaly = 1 AND (?1 IS NULL OR run_id = ?1)
             ORDER BY anomaly_probability DESC, result_id LIMIT ?2"
        );
        self.query_results(&sql, params![run_id, limit as i64])
    }

    /// Flagged rows whose message contains `keyword`, ignoring case.
    pub fn search_anomalies(
        &self,
        run_id: Option<&str>,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<AnomalyResult>, StoreError> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM anomaly_results
             WHERE is_anomaly = 1 AND (?1 IS NULL OR run_id = ?1)
               AND instr(lower(message), lower(?2)) > 0
             ORDER BY anomaly_probability DESC, result_id LIMIT ?3"
        );
        self.query_results(&sql, params![run_id, keyword, limit as i64])
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, file_name, total_logs, anomalies_detected, contamination_factor, run_timestamp
             FROM anomaly_runs ORDER BY run_timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, f64>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(run_id, file_name_filter, total, anomalies, contamination_factor, ts)| {
                let timestamp = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| StoreError::Corrupt {
                        table: "anomaly_runs",
                        detail: format!("run_timestamp '{ts}': {e}"),
                    })?
                    .with_timezone(&Utc);
                Ok(RunSummary {
                    run_id,
                    file_name_filter,
                    total_logs: total as usize,
                    anomalies_detected: anomalies as usize,
                    contamination_factor,
                    timestamp,
                })
            })
            .collect()
    }

    pub fn latest_run_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.recent_runs(1)?.into_iter().next().map(|r| r.run_id))
    }

    fn query_results(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AnomalyResult>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, result_columns)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(record_id, file_name, level, message, anomaly_score, anomaly_probability, is_anomaly)| {
                Ok(AnomalyResult {
                    record_id,
                    file_name,
                    log_level: parse_level("anomaly_results", &level)?,
                    message,
                    anomaly_score,
                    anomaly_probability,
                    is_anomaly,
                })
            })
            .collect()
    }
}

type ResultColumns = (i64, String, String, String, i8, f64, bool);

fn result_columns(r: &Row<'_>) -> rusqlite::Result<ResultColumns> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
    ))
}

fn parse_level(table: &'static str, s: &str) -> Result<LogLevel, StoreError> {
    s.parse().map_err(|e: crate::parser::UnknownLevel| StoreError::Corrupt {
        table,
        detail: e.to_string(),
    })
}

impl LogStore for SqliteStore {
    fn load_raw(&self, filter: &FileFilter) -> Result<Vec<RawLogRow>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT log_id, file_name, raw_line FROM raw_logs WHERE (?1 IS NULL OR file_name = ?1) ORDER BY log_id",
        )?;
        let rows = stmt
            .query_map(params![filter.file_name()], |r| {
                Ok(RawLogRow {
                    log_id: r.get(0)?,
                    file_name: r.get(1)?,
                    raw_text: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn replace_parsed(&self, records: &[ParsedLogRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM parsed_logs", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO parsed_logs (log_id, file_name, log_level, message, timestamp_extracted)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.id,
                    r.file_name,
                    r.log_level.as_str(),
                    r.message,
                    r.timestamp_extracted
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn append_results(&self, run_id: &str, results: &[AnomalyResult]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO anomaly_results (run_id, {RESULT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for r in results {
                stmt.execute(params![
                    run_id,
                    r.record_id,
                    r.file_name,
                    r.log_level.as_str(),
                    r.message,
                    r.anomaly_score,
                    r.anomaly_probability,
                    r.is_anomaly
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn append_run(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO anomaly_runs (run_id, file_name, total_logs, anomalies_detected, contamination_factor, run_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.run_id,
                summary.file_name_filter,
                summary.total_logs as i64,
                summary.anomalies_detected as i64,
                summary.contamination_factor,
                summary.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

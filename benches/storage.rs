//! SQLite store benchmark: bulk raw inserts and result reads.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use logsift::analyzer::AnomalyResult;
use logsift::ingest::RawLogLine;
use logsift::parser::LogLevel;
use logsift::storage::{FileFilter, LogStore, SqliteStore};
use tempfile::tempdir;

fn raw_lines(n: usize) -> Vec<RawLogLine> {
    (0..n)
        .map(|i| RawLogLine {
            file_name: "bench.log".to_string(),
            raw_text: format!("2025-10-30 10:00:00 INFO request {i} served"),
        })
        .collect()
}

fn results(n: usize) -> Vec<AnomalyResult> {
    (0..n)
        .map(|i| AnomalyResult {
            record_id: i as i64,
            file_name: "bench.log".to_string(),
            log_level: LogLevel::Info,
            message: format!("request {i} served"),
            anomaly_score: if i % 10 == 0 { -1 } else { 1 },
            anomaly_probability: 0.4 + (i % 10) as f64 * 0.02,
            is_anomaly: i % 10 == 0,
        })
        .collect()
}

fn bench_insert_raw(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("bench.db")).unwrap();
    let lines = raw_lines(1000);

    c.bench_function("storage_insert_raw_1000", |b| {
        b.iter(|| black_box(store.insert_raw(black_box(&lines))).unwrap())
    });
}

fn bench_results_roundtrip(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("bench.db")).unwrap();
    store.insert_raw(&raw_lines(1000)).unwrap();
    store.append_results("bench-run", &results(1000)).unwrap();

    c.bench_function("storage_load_raw_1000", |b| {
        b.iter(|| black_box(store.load_raw(&FileFilter::All)).unwrap())
    });
    c.bench_function("storage_top_anomalies_10", |b| {
        b.iter(|| black_box(store.top_anomalies(Some("bench-run"), 10)).unwrap())
    });
}

criterion_group!(benches, bench_insert_raw, bench_results_roundtrip);
criterion_main!(benches);

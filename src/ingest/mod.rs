//! Log file ingestion: files or directory trees → raw lines ready for storage.

use crate::config::IngestConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}: not found")]
    NotFound(PathBuf),
    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One line of one file, as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogLine {
    pub file_name: String,
    pub raw_text: String,
}

/// Reads log files. Directories are walked up to `max_depth`, keeping only
/// files with a configured extension.
pub struct LogCollector {
    extensions: Vec<String>,
    max_depth: usize,
}

impl LogCollector {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            extensions: config.extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            max_depth: config.max_depth,
        }
    }

    /// Lines from every path. Explicit file paths are read regardless of extension.
    pub fn collect(&self, paths: &[PathBuf]) -> Result<Vec<RawLogLine>, IngestError> {
        let mut out = Vec::new();
        for path in paths {
            if path.is_dir() {
                for file in self.files_under(path)? {
                    out.extend(read_log_file(&file)?);
                }
            } else if path.is_file() {
                out.extend(read_log_file(path)?);
            } else {
                return Err(IngestError::NotFound(path.clone()));
            }
        }
        info!(paths = paths.len(), lines = out.len(), "ingested log lines");
        Ok(out)
    }

    fn files_under(&self, root: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| IngestError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && self.wanted(entry.path()) {
                files.push(entry.into_path());
            }
        }
        debug!(root = %root.display(), files = files.len(), "scanned directory");
        Ok(files)
    }

    fn wanted(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

/// Trimmed, non-blank lines of `path`, tagged with the file's base name.
pub fn read_log_file(path: &Path) -> Result<Vec<RawLogLine>, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| RawLogLine {
            file_name: file_name.clone(),
            raw_text: l.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_skipped_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "  INFO a b c  \n\n   \nERROR x y z\n").unwrap();

        let lines = read_log_file(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].file_name, "app.log");
        assert_eq!(lines[0].raw_text, "INFO a b c");
        assert_eq!(lines[1].raw_text, "ERROR x y z");
    }

    #[test]
    fn directory_walk_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "INFO one\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "INFO two\n").unwrap();
        std::fs::write(dir.path().join("c.json"), "{}\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("d.LOG"), "INFO three\n").unwrap();

        let collector = LogCollector::new(&IngestConfig::default());
        let lines = collector.collect(&[dir.path().to_path_buf()]).unwrap();
        let mut names: Vec<_> = lines.iter().map(|l| l.file_name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a.log", "b.txt", "d.LOG"]);
    }

    #[test]
    fn missing_path_is_an_error() {
        let collector = LogCollector::new(&IngestConfig::default());
        let err = collector.collect(&[PathBuf::from("/definitely/not/here.log")]).unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }
}

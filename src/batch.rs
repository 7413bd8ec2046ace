/// Directory-level driver around the per-file pipeline.
///
/// Lists the regular files directly inside a directory (no recursion),
/// applies the configured filters and runs the pipeline once per file in
/// file-name order. A failing file is recorded and the batch moves on.
use crate::config::CompiledFilters;
use crate::pipeline::{FileFailure, FileRecord, Pipeline, PlannedMove};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that stop a batch before any file is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The directory does not exist or cannot be listed.
    #[error("Error reading directory {}: {source}", .path.display())]
    InvalidDirectory { path: PathBuf, source: io::Error },
    /// The path exists but is not a directory.
    #[error("{} is not a directory", .path.display())]
    NotADirectory { path: PathBuf },
}

/// Outcome of one pipeline invocation.
pub type FileOutcome = Result<FileRecord, FileFailure>;

/// Lists the files the pipeline should see, sorted by file name.
pub fn list_candidates(base_path: &Path, filters: &CompiledFilters) -> Result<Vec<PathBuf>, BatchError> {
    if base_path.exists() && !base_path.is_dir() {
        return Err(BatchError::NotADirectory {
            path: base_path.to_path_buf(),
        });
    }

    let entries = fs::read_dir(base_path).map_err(|e| BatchError::InvalidDirectory {
        path: base_path.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .filter(|path| {
            let keep = filters.should_include(path);
            if !keep {
                debug!(file = %path.display(), "excluded by filters");
            }
            keep
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Results of organizing one directory.
#[derive(Debug)]
pub struct BatchReport {
    pub base_path: PathBuf,
    /// One entry per file, in processing order.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileRecord> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileFailure> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Every audit line, file by file.
    pub fn logs(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .flat_map(|o| match o {
                Ok(record) => record.logs(),
                Err(failure) => failure.logs.as_slice(),
            })
            .map(String::as_str)
            .collect()
    }

    /// Number of successfully organized files per category.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.succeeded() {
            if let Some(category) = record.category() {
                *counts.entry(category.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Machine-readable form of the report.
    pub fn to_json(&self) -> Value {
        json!({
            "base_path": self.base_path.to_string_lossy(),
            "total": self.total(),
            "failed": self.failure_count(),
            "files": self.outcomes.iter().map(|outcome| match outcome {
                Ok(record) => json!({
                    "status": "organized",
                    "filepath": record.filepath().to_string_lossy(),
                    "category": record.category().map(|c| c.to_string()),
                    "new_path": record.new_path().map(|p| p.to_string_lossy().to_string()),
                    "logs": record.logs(),
                }),
                Err(failure) => json!({
                    "status": "failed",
                    "filepath": failure.filepath.to_string_lossy(),
                    "category": failure.category.as_ref().map(|c| c.to_string()),
                    "error": failure.error.to_string(),
                    "logs": failure.logs,
                }),
            }).collect::<Vec<_>>(),
        })
    }
}

/// Runs the pipeline for every candidate file in `base_path`.
///
/// `on_file` is called after each file with its outcome, e.g. to advance a
/// progress bar.
pub fn process_directory<F>(
    base_path: &Path,
    pipeline: &Pipeline,
    filters: &CompiledFilters,
    on_file: F,
) -> Result<BatchReport, BatchError>
where
    F: FnMut(&FileOutcome),
{
    let files = list_candidates(base_path, filters)?;
    Ok(process_files(base_path, files, pipeline, on_file))
}

/// Runs the pipeline over an already-listed set of files, one at a time.
pub fn process_files<F>(
    base_path: &Path,
    files: Vec<PathBuf>,
    pipeline: &Pipeline,
    mut on_file: F,
) -> BatchReport
where
    F: FnMut(&FileOutcome),
{
    info!(dir = %base_path.display(), files = files.len(), "organizing directory");

    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let outcome = pipeline.invoke(file);
        on_file(&outcome);
        outcomes.push(outcome);
    }

    BatchReport {
        base_path: base_path.to_path_buf(),
        outcomes,
    }
}

/// Dry-run counterpart of [`process_directory`]: classifies every candidate
/// but moves nothing.
pub fn preview_directory(
    base_path: &Path,
    pipeline: &Pipeline,
    filters: &CompiledFilters,
) -> Result<Vec<Result<PlannedMove, FileFailure>>, BatchError> {
    let files = list_candidates(base_path, filters)?;
    Ok(files.into_iter().map(|file| pipeline.preview(file)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OracleFailurePolicy, PipelineConfig};
    use crate::oracle::UnavailableOracle;
    use tempfile::TempDir;

    fn offline(policy: OracleFailurePolicy) -> Pipeline {
        Pipeline::new(
            PipelineConfig {
                on_oracle_failure: policy,
                ..PipelineConfig::default()
            },
            Box::new(UnavailableOracle::new("offline")),
        )
    }

    #[test]
    fn test_list_candidates_skips_dirs_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.pdf"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.txt"), "").unwrap();

        let files = list_candidates(dir.path(), &CompiledFilters::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.txt"]);
    }

    #[test]
    fn test_list_candidates_invalid_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            list_candidates(&missing, &CompiledFilters::default()),
            Err(BatchError::InvalidDirectory { .. })
        ));

        let file = dir.path().join("file.txt");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            list_candidates(&file, &CompiledFilters::default()),
            Err(BatchError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.unknown"), "").unwrap();
        fs::write(dir.path().join("b.pdf"), "").unwrap();
        fs::write(dir.path().join("c.png"), "").unwrap();

        let pipeline = offline(OracleFailurePolicy::Abort);
        let mut seen = 0;
        let report = process_directory(dir.path(), &pipeline, &CompiledFilters::default(), |_| {
            seen += 1
        })
        .unwrap();

        assert_eq!(seen, 3);
        assert_eq!(report.total(), 3);
        assert_eq!(report.failure_count(), 1);
        assert!(!report.is_complete_success());
        assert!(dir.path().join("a.unknown").exists());
        assert!(dir.path().join("organized/documents/b.pdf").exists());
        assert!(dir.path().join("organized/images/c.png").exists());

        let logs = report.logs();
        assert!(logs[0].starts_with("Failed to process a.unknown"));
        assert_eq!(logs.len(), 1 + 3 + 3);
    }

    #[test]
    fn test_category_counts_and_json() {
        let dir = TempDir::new().unwrap();
        for name in ["a.pdf", "b.txt", "c.png"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let pipeline = offline(OracleFailurePolicy::Fallback);
        let report =
            process_directory(dir.path(), &pipeline, &CompiledFilters::default(), |_| {}).unwrap();

        let counts = report.category_counts();
        assert_eq!(counts.get("documents"), Some(&2));
        assert_eq!(counts.get("images"), Some(&1));

        let json = report.to_json();
        assert_eq!(json["total"], 3);
        assert_eq!(json["failed"], 0);
        assert_eq!(json["files"][0]["status"], "organized");
        assert_eq!(json["files"][0]["category"], "documents");
        assert_eq!(json["files"][2]["logs"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_second_run_ignores_organized_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.pdf"), "").unwrap();
        let pipeline = offline(OracleFailurePolicy::Fallback);

        process_directory(dir.path(), &pipeline, &CompiledFilters::default(), |_| {}).unwrap();
        let again =
            process_directory(dir.path(), &pipeline, &CompiledFilters::default(), |_| {}).unwrap();

        assert_eq!(again.total(), 0);
        assert!(dir.path().join("organized/documents/a.pdf").exists());
    }

    #[test]
    fn test_preview_directory_moves_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.zip"), "").unwrap();
        fs::write(dir.path().join("README"), "").unwrap();

        let pipeline = offline(OracleFailurePolicy::Fallback);
        let plans = preview_directory(dir.path(), &pipeline, &CompiledFilters::default()).unwrap();

        assert_eq!(plans.len(), 2);
        let readme = plans[0].as_ref().unwrap();
        assert_eq!(readme.destination, dir.path().join("organized/others/README"));
        let zip = plans[1].as_ref().unwrap();
        assert_eq!(zip.destination, dir.path().join("organized/archives/a.zip"));
        assert!(!dir.path().join("organized").exists());
    }
}

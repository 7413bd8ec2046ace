//! The per-file classify → move → log pipeline.
//!
//! A [`Pipeline`] owns the extension resolver, the oracle classifier and the
//! placement executor. Each invocation threads one exclusively-owned
//! [`FileRecord`] through the three stages of a fixed state machine
//! ([`Stage`]). Stages only ever add to the record: the category is set
//! before the destination, the destination is set once, and the audit log
//! only grows.
//!
//! There is no rollback. If the move fails after classification succeeded,
//! the failure carries the category and the log written so far, and the file
//! is left where it was.
//!
//! ```no_run
//! use classifile::config::PipelineConfig;
//! use classifile::oracle::UnavailableOracle;
//! use classifile::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), Box::new(UnavailableOracle::new("offline")));
//! match pipeline.invoke("/home/me/Downloads/report.pdf") {
//!     Ok(record) => println!("moved to {}", record.new_path().unwrap().display()),
//!     Err(failure) => eprintln!("{}", failure),
//! }
//! ```

use crate::config::{OracleFailurePolicy, PipelineConfig};
use crate::file_category::{Category, CategoryResolver};
use crate::file_organizer::{FileOrganizer, PlacementError};
use crate::oracle::{Oracle, OracleClassifier, OracleError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Terminal audit entry written by the log stage.
pub const COMPLETION_MESSAGE: &str = "Completed file processing.";

/// Errors that stop a single file's pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The path is not an existing regular file, or a stage was entered out of order.
    #[error("{} cannot be processed: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },
    /// The oracle failed and the policy says to abort.
    #[error("classification failed: {0}")]
    Classification(#[from] OracleError),
    /// The file could not be moved.
    #[error(transparent)]
    Placement(#[from] PlacementError),
}

/// The unit of work threaded through the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    filepath: PathBuf,
    category: Option<Category>,
    new_path: Option<PathBuf>,
    logs: Vec<String>,
}

impl FileRecord {
    /// Creates a record for an existing regular file.
    pub fn new(filepath: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let filepath = filepath.into();
        let reason = match fs::metadata(&filepath) {
            Ok(meta) if meta.is_file() => None,
            Ok(_) => Some("not a regular file".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            return Err(PipelineError::InvalidInput {
                path: filepath,
                reason,
            });
        }

        Ok(Self {
            filepath,
            category: None,
            new_path: None,
            logs: Vec::new(),
        })
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Base name of the source file.
    pub fn file_name(&self) -> String {
        display_name(&self.filepath)
    }

    /// Set by the classify stage.
    pub fn category(&self) -> Option<&Category> {
        self.category.as_ref()
    }

    /// Set by the move stage.
    pub fn new_path(&self) -> Option<&Path> {
        self.new_path.as_deref()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<String> {
        self.logs
    }

    fn push_log(&mut self, entry: String) {
        self.logs.push(entry);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A file whose pipeline stopped early.
///
/// `logs` holds every entry written before the failure followed by a line
/// starting with `Failed to process`.
#[derive(Debug, Error)]
#[error("Failed to process {}: {error}", .filepath.display())]
pub struct FileFailure {
    pub filepath: PathBuf,
    pub category: Option<Category>,
    pub logs: Vec<String>,
    #[source]
    pub error: PipelineError,
}

impl FileFailure {
    fn from_record(record: FileRecord, error: PipelineError) -> Self {
        let FileRecord {
            filepath,
            category,
            mut logs,
            ..
        } = record;
        logs.push(format!(
            "Failed to process {}: {}",
            display_name(&filepath),
            error
        ));
        Self {
            filepath,
            category,
            logs,
            error,
        }
    }

    fn rejected(filepath: PathBuf, error: PipelineError) -> Self {
        let logs = vec![format!(
            "Failed to process {}: {}",
            display_name(&filepath),
            error
        )];
        Self {
            filepath,
            category: None,
            logs,
            error,
        }
    }

    /// Whether the record had been classified before the failure.
    pub fn was_classified(&self) -> bool {
        self.category.is_some()
    }
}

/// States of the per-file state machine. Each has exactly one successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Move,
    Log,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Classify => Stage::Move,
            Stage::Move => Stage::Log,
            Stage::Log | Stage::Done => Stage::Done,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Move => "move",
            Stage::Log => "log",
            Stage::Done => "done",
        }
    }
}

/// Classify → move → log, one file at a time.
pub struct Pipeline {
    resolver: CategoryResolver,
    classifier: OracleClassifier,
    organizer: FileOrganizer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, oracle: Box<dyn Oracle>) -> Self {
        Self {
            resolver: CategoryResolver::default(),
            classifier: OracleClassifier::new(oracle),
            organizer: FileOrganizer::from_config(&config),
            config,
        }
    }

    /// Replaces the extension table.
    pub fn with_resolver(mut self, resolver: CategoryResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn organizer(&self) -> &FileOrganizer {
        &self.organizer
    }

    /// Runs all three stages for one file.
    ///
    /// Paths that are not existing regular files are rejected before the
    /// classify stage.
    pub fn invoke(&self, filepath: impl Into<PathBuf>) -> Result<FileRecord, FileFailure> {
        let filepath = filepath.into();
        let mut record = FileRecord::new(filepath.clone())
            .map_err(|error| FileFailure::rejected(filepath, error))?;

        let mut stage = Stage::Classify;
        while stage != Stage::Done {
            debug!(stage = stage.name(), file = %record.filepath.display(), "entering stage");
            record = self.run_stage(stage, record)?;
            stage = stage.next();
        }
        Ok(record)
    }

    /// Runs a single stage.
    pub fn run_stage(&self, stage: Stage, record: FileRecord) -> Result<FileRecord, FileFailure> {
        match stage {
            Stage::Classify => self.classify(record),
            Stage::Move => self.place(record),
            Stage::Log => Ok(self.finish(record)),
            Stage::Done => Ok(record),
        }
    }

    /// Classify stage: extension table first, oracle on a miss.
    pub fn classify(&self, mut record: FileRecord) -> Result<FileRecord, FileFailure> {
        if record.category.is_some() {
            return Err(out_of_order(record, "file is already classified"));
        }

        let file_name = record.file_name();
        let category = match self.resolver.resolve(&file_name) {
            Some(category) => category,
            None => match self.classifier.classify(&file_name) {
                Ok(category) => category,
                Err(error) => match self.config.on_oracle_failure {
                    OracleFailurePolicy::Fallback => {
                        warn!(file = file_name.as_str(), %error, "oracle failed, using default category");
                        record.push_log(format!(
                            "Oracle classification failed for {} ({}); defaulting to {}",
                            file_name,
                            error,
                            Category::others()
                        ));
                        Category::others()
                    }
                    OracleFailurePolicy::Abort => {
                        warn!(file = file_name.as_str(), %error, "oracle failed, aborting file");
                        return Err(FileFailure::from_record(
                            record,
                            PipelineError::Classification(error),
                        ));
                    }
                },
            },
        };

        record.push_log(format!("Classified {} as {}", file_name, category));
        record.category = Some(category);
        Ok(record)
    }

    /// Move stage: hands the classified file to the placement executor.
    pub fn place(&self, mut record: FileRecord) -> Result<FileRecord, FileFailure> {
        if record.new_path.is_some() {
            return Err(out_of_order(record, "file has already been moved"));
        }
        let Some(category) = record.category.clone() else {
            return Err(out_of_order(record, "file has not been classified"));
        };

        match self.organizer.place(&record.filepath, &category) {
            Ok(new_path) => {
                info!(from = %record.filepath.display(), to = %new_path.display(), "file organized");
                record.push_log(format!("Moved file to {}", new_path.display()));
                record.new_path = Some(new_path);
                Ok(record)
            }
            Err(error) => Err(FileFailure::from_record(record, error.into())),
        }
    }

    /// Log stage: appends the terminal marker.
    pub fn finish(&self, mut record: FileRecord) -> FileRecord {
        record.push_log(COMPLETION_MESSAGE.to_string());
        record
    }

    /// Classifies a file and computes its destination without moving it.
    pub fn preview(&self, filepath: impl Into<PathBuf>) -> Result<PlannedMove, FileFailure> {
        let filepath = filepath.into();
        let record = FileRecord::new(filepath.clone())
            .map_err(|error| FileFailure::rejected(filepath, error))?;
        let record = self.classify(record)?;

        let category = record.category.clone().unwrap_or_else(Category::others);
        let absolute = std::path::absolute(&record.filepath).unwrap_or_else(|_| record.filepath.clone());
        match self.organizer.destination_for(&absolute, &category) {
            Ok(destination) => Ok(PlannedMove {
                record,
                destination,
            }),
            Err(error) => Err(FileFailure::from_record(record, error.into())),
        }
    }
}

fn out_of_order(record: FileRecord, reason: &str) -> FileFailure {
    let path = record.filepath.clone();
    FileFailure::from_record(
        record,
        PipelineError::InvalidInput {
            path,
            reason: reason.to_string(),
        },
    )
}

/// Result of [`Pipeline::preview`]: a classified record and where it would go.
#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub record: FileRecord,
    pub destination: PathBuf,
}

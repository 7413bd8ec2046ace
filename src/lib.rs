//! classifile - sort the files of a directory into category folders
//!
//! Each file goes through a fixed classify → move → log pipeline. The
//! category comes from a table of known extensions, or from an external LLM
//! oracle when the extension is unknown. The file is then moved to
//! `<dir>/organized/<category>/` and an audit log is returned to the caller.

pub mod batch;
pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod oracle;
pub mod oracle_http;
pub mod output;
pub mod pipeline;

pub use batch::{BatchReport, process_directory};
pub use config::{CompiledFilters, ConfigError, OracleFailurePolicy, OrganizerConfig, PipelineConfig};
pub use file_category::{Category, CategoryResolver};
pub use file_organizer::{CollisionPolicy, FileOrganizer, PlacementError};
pub use oracle::{Oracle, OracleClassifier, OracleError};
pub use pipeline::{FileFailure, FileRecord, Pipeline, PipelineError, Stage};

pub use cli::{OrganizeCommand, run_cli};

//! Command-line interface module for classifile.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Configuration loading and command-line overrides
//! - Organization and dry-run orchestration
//! - Reporting per-file results to the operator

use crate::batch::{self, BatchReport};
use crate::config::{CompiledFilters, OracleFailurePolicy, OracleProvider, OrganizerConfig};
use crate::file_organizer::CollisionPolicy;
use crate::oracle_http::build_oracle;
use crate::output::OutputFormatter;
use crate::pipeline::Pipeline;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sort the files of a directory into organized/<category>/ folders.
#[derive(Debug, Parser)]
#[command(name = "classifile", version, about)]
pub struct Cli {
    /// Directory whose files should be organized (not recursive)
    pub directory: PathBuf,

    /// Show where files would go without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Oracle backend for unknown extensions
    #[arg(long, value_enum)]
    pub provider: Option<OracleProvider>,

    /// What to do when the oracle call fails
    #[arg(long, value_enum)]
    pub on_oracle_failure: Option<OracleFailurePolicy>,

    /// What to do when the destination file already exists
    #[arg(long, value_enum)]
    pub on_collision: Option<CollisionPolicy>,

    /// Print every audit-log entry, not just one line per file
    #[arg(long)]
    pub show_logs: bool,

    /// Print the report as JSON
    #[arg(long, conflicts_with = "dry_run")]
    pub json: bool,

    /// Increase diagnostic logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn command(&self) -> OrganizeCommand {
        if self.dry_run {
            OrganizeCommand::DryRun
        } else {
            OrganizeCommand::Organize
        }
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            config_path: self.config.clone(),
            provider: self.provider,
            on_oracle_failure: self.on_oracle_failure,
            on_collision: self.on_collision,
            show_logs: self.show_logs,
            json: self.json,
        }
    }
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizeCommand {
    /// Classify and move every file.
    Organize,
    /// Classify every file and report the destinations only.
    DryRun,
}

/// Settings that come from the command line rather than the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub provider: Option<OracleProvider>,
    pub on_oracle_failure: Option<OracleFailurePolicy>,
    pub on_collision: Option<CollisionPolicy>,
    pub show_logs: bool,
    pub json: bool,
}

/// What a run did, for choosing the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStatus {
    pub processed: usize,
    pub failed: usize,
}

/// Loads the configuration and applies command-line overrides.
pub fn load_config(options: &RunOptions) -> Result<OrganizerConfig, String> {
    let mut config = OrganizerConfig::load(options.config_path.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;

    if let Some(provider) = options.provider {
        config.oracle.provider = provider;
    }
    if let Some(policy) = options.on_oracle_failure {
        config.pipeline.on_oracle_failure = policy;
    }
    if let Some(policy) = options.on_collision {
        config.pipeline.on_collision = policy;
    }
    Ok(config)
}

/// Runs the CLI with the default configuration lookup.
///
/// # Examples
///
/// ```no_run
/// use classifile::cli::{OrganizeCommand, run_cli};
/// use std::path::Path;
///
/// match run_cli(OrganizeCommand::Organize, Path::new("/path/to/directory")) {
///     Ok(status) => println!("{} files, {} failed", status.processed, status.failed),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(command: OrganizeCommand, dir_path: &Path) -> Result<RunStatus, String> {
    run_cli_with_config(command, dir_path, &RunOptions::default())
}

/// Runs the CLI: loads configuration, builds the oracle and the pipeline,
/// then organizes (or previews) `dir_path`.
pub fn run_cli_with_config(
    command: OrganizeCommand,
    dir_path: &Path,
    options: &RunOptions,
) -> Result<RunStatus, String> {
    let config = load_config(options)?;
    let filters = config
        .compile_filters()
        .map_err(|e| format!("Error compiling filters: {}", e))?;
    let pipeline = Pipeline::new(config.pipeline.clone(), build_oracle(&config.oracle));

    run_with_pipeline(command, dir_path, &pipeline, &filters, options)
}

/// Runs a command with an already-built pipeline.
pub fn run_with_pipeline(
    command: OrganizeCommand,
    dir_path: &Path,
    pipeline: &Pipeline,
    filters: &CompiledFilters,
    options: &RunOptions,
) -> Result<RunStatus, String> {
    match command {
        OrganizeCommand::Organize => organize_directory(dir_path, pipeline, filters, options),
        OrganizeCommand::DryRun => organize_directory_dry_run(dir_path, pipeline, filters),
    }
}

/// Runs the pipeline over every file in `base_path` and reports the results.
fn organize_directory(
    base_path: &Path,
    pipeline: &Pipeline,
    filters: &CompiledFilters,
    options: &RunOptions,
) -> Result<RunStatus, String> {
    let candidates = batch::list_candidates(base_path, filters).map_err(|e| e.to_string())?;

    let pb = if options.json {
        indicatif::ProgressBar::hidden()
    } else {
        OutputFormatter::info(&format!("Organizing contents of: {}", base_path.display()));
        OutputFormatter::create_progress_bar(candidates.len() as u64)
    };

    let report = batch::process_files(base_path, candidates, pipeline, |outcome| {
        let name = match outcome {
            Ok(record) => record.file_name(),
            Err(failure) => failure.filepath.display().to_string(),
        };
        pb.set_message(name);
        pb.inc(1);
    });
    pb.finish_and_clear();

    let status = RunStatus {
        processed: report.total(),
        failed: report.failure_count(),
    };

    if options.json {
        OutputFormatter::plain(&report.to_json().to_string());
        return Ok(status);
    }

    print_report(&report, options.show_logs);
    Ok(status)
}

fn print_report(report: &BatchReport, show_logs: bool) {
    if report.total() == 0 {
        OutputFormatter::plain("No files found to organize.");
        return;
    }

    OutputFormatter::header("Files processed:");
    for outcome in &report.outcomes {
        let logs = match outcome {
            Ok(record) => {
                let category = record
                    .category()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                OutputFormatter::success(&format!("{} → {}/", record.file_name(), category));
                record.logs()
            }
            Err(failure) => {
                OutputFormatter::error(&failure.to_string());
                failure.logs.as_slice()
            }
        };
        if show_logs {
            logs.iter().for_each(|entry| OutputFormatter::log_line(entry));
        }
    }

    OutputFormatter::summary_table(&report.category_counts(), report.total() - report.failure_count());

    if report.is_complete_success() {
        OutputFormatter::success("Organization complete!");
    } else {
        OutputFormatter::warning(&format!(
            "{} of {} files could not be organized and were left in place. Please review errors above.",
            report.failure_count(),
            report.total()
        ));
    }
}

/// Classifies every file and shows where it would go, without moving anything.
fn organize_directory_dry_run(
    base_path: &Path,
    pipeline: &Pipeline,
    filters: &CompiledFilters,
) -> Result<RunStatus, String> {
    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", base_path.display()));

    let plans = batch::preview_directory(base_path, pipeline, filters).map_err(|e| e.to_string())?;
    if plans.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(RunStatus::default());
    }

    OutputFormatter::header("DRY RUN: Files would be organized as follows:");
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut failed = 0;

    for plan in &plans {
        match plan {
            Ok(plan) => {
                let category = plan
                    .record
                    .category()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                OutputFormatter::plain(&format!(
                    " - {}\n   → Would move to {}",
                    plan.record.file_name(),
                    plan.destination.display()
                ));
                *category_counts.entry(category).or_insert(0) += 1;
            }
            Err(failure) => {
                failed += 1;
                OutputFormatter::error(&failure.to_string());
            }
        }
    }

    OutputFormatter::summary_table(&category_counts, plans.len() - failed);
    OutputFormatter::dry_run_notice("Dry run complete. No files were modified.");

    Ok(RunStatus {
        processed: plans.len(),
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "classifile",
            "/tmp/inbox",
            "--dry-run",
            "--provider",
            "openai",
            "--on-oracle-failure",
            "abort",
            "--on-collision",
            "rename",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.directory, PathBuf::from("/tmp/inbox"));
        assert_eq!(cli.command(), OrganizeCommand::DryRun);
        assert_eq!(cli.verbose, 2);

        let options = cli.options();
        assert_eq!(options.provider, Some(OracleProvider::OpenAi));
        assert_eq!(options.on_oracle_failure, Some(OracleFailurePolicy::Abort));
        assert_eq!(options.on_collision, Some(CollisionPolicy::Rename));
    }

    #[test]
    fn test_cli_defaults_to_organize() {
        let cli = Cli::try_parse_from(["classifile", "."]).unwrap();
        assert_eq!(cli.command(), OrganizeCommand::Organize);
        assert!(cli.config.is_none());
        assert!(!cli.show_logs);
    }

    #[test]
    fn test_cli_rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["classifile", ".", "--on-collision", "merge"]).is_err());
    }

    #[test]
    fn test_json_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["classifile", ".", "--json", "--dry-run"]).is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("classifile.toml");
        std::fs::write(
            &config_path,
            r#"
[oracle]
provider = "openai"

[pipeline]
on_collision = "rename"
organized_dir = "sorted"
"#,
        )
        .unwrap();

        let options = RunOptions {
            config_path: Some(config_path),
            provider: Some(OracleProvider::None),
            on_oracle_failure: Some(OracleFailurePolicy::Abort),
            on_collision: Some(CollisionPolicy::Overwrite),
            ..RunOptions::default()
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.oracle.provider, OracleProvider::None);
        assert_eq!(config.pipeline.on_oracle_failure, OracleFailurePolicy::Abort);
        assert_eq!(config.pipeline.on_collision, CollisionPolicy::Overwrite);
        assert_eq!(config.pipeline.organized_dir, "sorted");
    }

    #[test]
    fn test_config_file_values_kept_without_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("classifile.toml");
        std::fs::write(&config_path, "[pipeline]\non_collision = \"rename\"\n").unwrap();

        let options = RunOptions {
            config_path: Some(config_path),
            ..RunOptions::default()
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.pipeline.on_collision, CollisionPolicy::Rename);
        assert_eq!(config.pipeline.on_oracle_failure, OracleFailurePolicy::Fallback);
    }
}

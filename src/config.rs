//! Configuration loading and file filtering.
//!
//! Configuration is stored in TOML. Every section is optional:
//!
//! ```toml
//! [oracle]
//! provider = "gemini"            # "gemini" | "openai" | "none"
//! model = "gemini-2.5-flash"
//! api_key_env = "GEMINI_API_KEY"
//! timeout_secs = 60
//!
//! [pipeline]
//! on_oracle_failure = "fallback" # or "abort"
//! on_collision = "fail"          # or "rename", "overwrite"
//! organized_dir = "organized"
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::file_organizer::CollisionPolicy;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// A value parsed but is not acceptable.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Which oracle backend to use for unknown extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat completion API.
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    /// No oracle; unknown extensions follow the failure policy.
    None,
}

/// What to do when the oracle call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OracleFailurePolicy {
    /// Log the failure and classify the file as `others`.
    #[default]
    Fallback,
    /// Fail the file; it is left where it is.
    Abort,
}

/// Oracle connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub provider: OracleProvider,
    /// Model name; defaults depend on the provider.
    #[serde(default)]
    pub model: Option<String>,
    /// API root; defaults depend on the provider.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OracleConfig {
    pub fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                OracleProvider::OpenAi => "gpt-4o-mini",
                _ => "gemini-2.5-flash",
            }
            .to_string()
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            match self.provider {
                OracleProvider::OpenAi => "https://api.openai.com",
                _ => "https://generativelanguage.googleapis.com",
            }
            .to_string()
        })
    }

    pub fn api_key_env(&self) -> String {
        self.api_key_env.clone().unwrap_or_else(|| {
            match self.provider {
                OracleProvider::OpenAi => "OPENAI_API_KEY",
                _ => "GEMINI_API_KEY",
            }
            .to_string()
        })
    }

    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Settings handed to the pipeline for every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub on_oracle_failure: OracleFailurePolicy,
    #[serde(default)]
    pub on_collision: CollisionPolicy,
    /// Name of the directory created next to each file.
    #[serde(default = "default_organized_dir")]
    pub organized_dir: String,
}

fn default_organized_dir() -> String {
    "organized".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_oracle_failure: OracleFailurePolicy::default(),
            on_collision: CollisionPolicy::default(),
            organized_dir: default_organized_dir(),
        }
    }
}

impl PipelineConfig {
    /// Checks that `organized_dir` is a single plain path component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut components = Path::new(&self.organized_dir).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(ConfigError::InvalidValue {
                field: "pipeline.organized_dir".to_string(),
                reason: format!(
                    "'{}' must be a single directory name",
                    self.organized_dir
                ),
            }),
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizerConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Rules deciding which files are handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl OrganizerConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.classifilerc.toml` in the current directory
    /// 3. Look for `~/.config/classifile/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any loaded file is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".classifilerc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("classifile")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Compile the filter rules into matchers.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Pre-compiled filter rules.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a file should be handed to the pipeline.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_any(&self.include_patterns, file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_any(&self.exclude_patterns, file_path) {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }

    fn matches_any(&self, patterns: &[Pattern], file_path: &Path) -> bool {
        let file_name = file_path.file_name().map(Path::new);
        patterns.iter().any(|pattern| {
            pattern.matches_path(file_path) || file_name.is_some_and(|n| pattern.matches_path(n))
        })
    }
}

impl Default for CompiledFilters {
    fn default() -> Self {
        Self {
            enable_hidden_files: false,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }
}

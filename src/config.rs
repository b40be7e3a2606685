//! Configuration loading for Stepgate.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.stepgate/config.toml`)
//! 3. User config (`~/.stepgate/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with the defaults when no
//! config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, StepgateError};
use crate::evaluate::DEFAULT_TOLERANCE;
use crate::storage::DEFAULT_KEY_PREFIX;
use crate::util::read_to_string_limited;

/// Main configuration struct for Stepgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Answer checking.
    pub evaluation: EvaluationConfig,
    /// Interpreter used for code sections.
    pub runner: RunnerConfig,
    /// Where progress is kept.
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Tolerance for numeric exercises that declare none.
    pub default_tolerance: f64,
}

impl EvaluationConfig {
    pub fn is_valid_tolerance(value: f64) -> bool {
        value.is_finite() && value >= 0.0
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            default_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Interpreter process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Interpreter executable.
    pub program: String,
    /// Arguments making the interpreter read the program from stdin.
    pub args: Vec<String>,
    /// Line appended to the learner's code to print a validator's truthiness.
    /// `{expression}` is replaced by the validator.
    pub validate_template: String,
}

impl RunnerConfig {
    pub fn is_valid_template(value: &str) -> bool {
        value.contains("{expression}")
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-".to_string()],
            validate_template: "print(bool({expression}))".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// First segment of every storage key.
    pub key_prefix: String,
    /// Directory for progress files. Defaults to `<stepgate_home>/progress`.
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Prefixes become part of file names.
    pub fn is_valid_key_prefix(value: &str) -> bool {
        !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    fn load_user_config() -> Option<Config> {
        let home = stepgate_home()?;
        Self::load_optional(&home.join("config.toml"))
    }

    fn load_project_config(cwd: &Path) -> Option<Config> {
        Self::load_optional(&cwd.join(".stepgate").join("config.toml"))
    }

    /// A missing file is silent; a broken one is reported and skipped.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        match Self::load_from_file(path) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = read_to_string_limited(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| StepgateError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no layer may set.
    pub fn validate(&self) -> Result<()> {
        if !EvaluationConfig::is_valid_tolerance(self.evaluation.default_tolerance) {
            return Err(StepgateError::config(format!(
                "evaluation.default_tolerance must be a non-negative number, got {}",
                self.evaluation.default_tolerance
            )));
        }
        if self.runner.program.trim().is_empty() {
            return Err(StepgateError::config("runner.program is empty"));
        }
        if !RunnerConfig::is_valid_template(&self.runner.validate_template) {
            return Err(StepgateError::config(
                "runner.validate_template must contain {expression}",
            ));
        }
        if !StorageConfig::is_valid_key_prefix(&self.storage.key_prefix) {
            return Err(StepgateError::config(format!(
                "storage.key_prefix {:?} may only contain letters, digits, '-' and '_'",
                self.storage.key_prefix
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // STEPGATE_TOLERANCE
        if let Ok(val) = env::var("STEPGATE_TOLERANCE") {
            match val.parse::<f64>() {
                Ok(n) if EvaluationConfig::is_valid_tolerance(n) => {
                    self.evaluation.default_tolerance = n;
                }
                _ => eprintln!(
                    "Warning: Invalid STEPGATE_TOLERANCE value '{}'. \
                    Expected a non-negative number. Using '{}'.",
                    val, self.evaluation.default_tolerance
                ),
            }
        }

        // STEPGATE_RUNNER: program followed by its arguments
        if let Ok(val) = env::var("STEPGATE_RUNNER") {
            let mut parts = val.split_whitespace();
            match parts.next() {
                Some(program) => {
                    self.runner.program = program.to_string();
                    let args: Vec<String> = parts.map(str::to_string).collect();
                    if !args.is_empty() {
                        self.runner.args = args;
                    }
                }
                None => eprintln!(
                    "Warning: STEPGATE_RUNNER is empty. Using '{}'.",
                    self.runner.program
                ),
            }
        }

        // STEPGATE_KEY_PREFIX
        if let Ok(val) = env::var("STEPGATE_KEY_PREFIX") {
            if StorageConfig::is_valid_key_prefix(&val) {
                self.storage.key_prefix = val;
            } else {
                eprintln!(
                    "Warning: Invalid STEPGATE_KEY_PREFIX value '{}'. \
                    Expected letters, digits, '-' or '_'. Using '{}'.",
                    val, self.storage.key_prefix
                );
            }
        }

        // STEPGATE_STORAGE_DIR
        if let Ok(val) = env::var("STEPGATE_STORAGE_DIR") {
            if val.is_empty() {
                eprintln!("Warning: STEPGATE_STORAGE_DIR is empty. Ignoring.");
            } else {
                self.storage.dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Values in `other` that differ from the defaults replace values in
    /// `self`, so each layer only needs to list its customizations. A layer
    /// cannot set a field back to its default value.
    fn merge(mut self, other: Config) -> Self {
        let default_evaluation = EvaluationConfig::default();
        if other.evaluation.default_tolerance != default_evaluation.default_tolerance {
            self.evaluation.default_tolerance = other.evaluation.default_tolerance;
        }

        let default_runner = RunnerConfig::default();
        if other.runner.program != default_runner.program {
            self.runner.program = other.runner.program;
        }
        if other.runner.args != default_runner.args {
            self.runner.args = other.runner.args;
        }
        if other.runner.validate_template != default_runner.validate_template {
            self.runner.validate_template = other.runner.validate_template;
        }

        if other.storage.key_prefix != DEFAULT_KEY_PREFIX {
            self.storage.key_prefix = other.storage.key_prefix;
        }
        if other.storage.dir.is_some() {
            self.storage.dir = other.storage.dir;
        }

        self
    }

    /// Directory holding progress files for this configuration.
    pub fn progress_dir(&self) -> Option<PathBuf> {
        self.storage.dir.clone().or_else(progress_dir)
    }
}

/// Get the Stepgate home directory.
///
/// Uses `STEPGATE_HOME` when set and non-empty, else `~/.stepgate`.
pub fn stepgate_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("STEPGATE_HOME") {
        if home.is_empty() {
            tracing::warn!("STEPGATE_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("STEPGATE_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    dirs::home_dir().map(|home| home.join(".stepgate"))
}

/// Default progress directory, `<stepgate_home>/progress/`.
pub fn progress_dir() -> Option<PathBuf> {
    stepgate_home().map(|h| h.join("progress"))
}

//! Unified error types for Stepgate with a fail-open persistence policy.
//!
//! Learner mistakes are never errors: judges return a `Verdict`. Errors here
//! cover precondition failures (bad module definition, out-of-range or locked
//! sections, early checkpoint) and infrastructure failures. Persistence
//! failures are swallowed through [`FailOpen`] so a session keeps working in
//! memory when the store is unavailable.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Stepgate operations.
#[derive(Error, Debug)]
pub enum StepgateError {
    /// I/O errors from the file-backed store.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON serialization/deserialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// The module definition is missing or malformed.
    #[error("invalid module: {message}")]
    InvalidModule { message: String },

    /// A section index outside the module's content.
    #[error("section {index} out of range (module has {len} sections)")]
    SectionOutOfRange { index: usize, len: usize },

    /// Completion requested for a section that does not gate progression.
    #[error("section {index} is not a blocking section")]
    NotBlocking { index: usize },

    /// Attempt submitted for a section that is still locked.
    #[error("section {index} is locked")]
    SectionLocked { index: usize },

    /// Attempt submitted through the wrong judge for the section.
    #[error("section {index} is not a {expected} section")]
    WrongSectionKind {
        index: usize,
        expected: &'static str,
    },

    /// Numeric answer could not be parsed.
    #[error("invalid input: {input:?} is not a number")]
    InvalidInput { input: String },

    /// A choice was judged before an option was selected.
    #[error("no option selected")]
    NoSelection,

    /// The execution collaborator raised or wrote to stderr.
    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    /// Checkpoint attempted before every blocking section was completed.
    #[error("incomplete exercises: {completed} of {total} completed")]
    IncompleteExercises { completed: usize, total: usize },

    /// Section tag the engine does not recognize.
    #[error("unknown section type: {kind}")]
    UnknownSectionType { kind: String },
}

/// A specialized Result type for Stepgate operations.
pub type Result<T> = std::result::Result<T, StepgateError>;

impl StepgateError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid module error.
    pub fn invalid_module(message: impl Into<String>) -> Self {
        Self::InvalidModule {
            message: message.into(),
        }
    }

    /// Create an execution failure.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Create an unknown section type error.
    pub fn unknown_section_type(kind: impl Into<String>) -> Self {
        Self::UnknownSectionType { kind: kind.into() }
    }
}

impl From<io::Error> for StepgateError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for StepgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Logs a warning and substitutes a safe value instead of propagating.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the Stepgate CLI.
pub mod exit_codes {
    /// The command succeeded (answer correct, checkpoint passed, ...).
    pub const SUCCESS: i32 = 0;

    /// The command ran but the attempt was rejected.
    pub const REJECTED: i32 = 1;

    /// The command could not run (bad module, bad arguments).
    pub const ERROR: i32 = 2;
}

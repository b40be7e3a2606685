//! CLI commands for Stepgate.
//!
//! Every command works on one module definition file and the learner's
//! stored progress for it:
//! - **Inspection**: status, hint, solution
//! - **Attempts**: answer, choose, run
//! - **Module**: checkpoint, reset

pub mod checkpoint;
pub mod reset;
pub mod reveal;
pub mod status;
pub mod submit;

pub use checkpoint::CheckpointCommand;
pub use reset::ResetCommand;
pub use reveal::{RevealCommand, RevealKind};
pub use status::StatusCommand;
pub use submit::{SubmitCommand, Submission};

use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::core::{Module, ProgressionEngine};
use crate::error::{Result, StepgateError};
use crate::evaluate::ProcessRunner;
use crate::storage::FileStore;

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

impl OutputOptions {
    /// Render `output` as pretty JSON, as text via `human`, or not at all.
    pub fn render<T: Serialize>(&self, output: &T, human: impl FnOnce(&T) -> String) -> String {
        if self.quiet {
            return String::new();
        }

        if self.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            human(output)
        }
    }
}

/// Engine used by the binary: progress in files, code in a local interpreter.
pub type FileEngine = ProgressionEngine<FileStore, ProcessRunner>;

/// Load a module definition and open its stored progress, repaired and
/// ready to render.
pub fn open_engine(module_path: &Path, config: &Config) -> Result<FileEngine> {
    let module = Module::load(module_path)?;

    let dir = config.progress_dir().ok_or_else(|| {
        StepgateError::config("Could not determine progress directory (no home directory)")
    })?;
    let store = FileStore::with_dir(dir)?;
    let runner = ProcessRunner::from_config(&config.runner);

    let mut engine = ProgressionEngine::new(module, store, runner, config);
    engine.ensure_consistency();
    Ok(engine)
}

//! Module checkpoint gate.
//!
//! The checkpoint is the module-level completion action. It opens only once
//! every blocking section is completed.

use crate::core::module::Module;
use crate::core::objectives::ObjectiveTracker;
use crate::core::state::ProgressionState;
use crate::error::{Result, StepgateError};

/// Checks and applies the module checkpoint.
///
/// Only touches the in-memory state; persisting the completed flag is the
/// engine's job.
#[derive(Debug)]
pub struct CheckpointGate<'a> {
    module: &'a Module,
    state: &'a mut ProgressionState,
}

impl<'a> CheckpointGate<'a> {
    pub fn new(module: &'a Module, state: &'a mut ProgressionState) -> Self {
        Self { module, state }
    }

    /// Blocking sections completed so far.
    pub fn completed(&self) -> usize {
        self.state.count_completed_blocking(self.module)
    }

    /// Blocking sections in the module.
    pub fn total(&self) -> usize {
        self.module.count_blocking()
    }

    /// Whether every blocking section is completed.
    pub fn can_checkpoint(&self) -> bool {
        self.completed() >= self.total()
    }

    /// Fail with `IncompleteExercises` unless the gate is open.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.can_checkpoint() {
            Ok(())
        } else {
            Err(StepgateError::IncompleteExercises {
                completed: self.completed(),
                total: self.total(),
            })
        }
    }

    /// Pass the checkpoint: progress goes to 100 and every objective is
    /// completed regardless of section links.
    ///
    /// Returns the number of objectives completed by this call.
    pub fn complete(mut self) -> Result<usize> {
        self.ensure_ready()?;

        self.state.progress = 100;
        let newly = ObjectiveTracker::new(&mut self.state.objectives, self.module.objectives.len())
            .complete_all();

        tracing::debug!(
            "checkpoint passed for module {} ({} objectives newly completed)",
            self.module.id,
            newly
        );
        Ok(newly)
    }
}

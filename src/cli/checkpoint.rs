//! Checkpoint command for Stepgate.
//!
//! Marks the whole module done once every exercise is solved.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::OutputOptions;
use crate::core::{ModuleCompletion, ProgressionEngine};
use crate::evaluate::CodeRunner;
use crate::storage::KeyValueStore;

/// Output format for the checkpoint command.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointOutput {
    pub success: bool,
    pub module_id: String,
    /// Blocking sections completed.
    pub completed: usize,
    /// Blocking sections in the module.
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub objectives_completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The checkpoint command implementation.
pub struct CheckpointCommand<'a, S: KeyValueStore, R: CodeRunner> {
    engine: &'a mut ProgressionEngine<S, R>,
}

impl<'a, S: KeyValueStore, R: CodeRunner> CheckpointCommand<'a, S, R> {
    pub fn new(engine: &'a mut ProgressionEngine<S, R>) -> Self {
        Self { engine }
    }

    pub fn run(&mut self) -> CheckpointOutput {
        let result = self.engine.complete_checkpoint();
        let completed = self.engine.count_completed_blocking();
        let total = self.engine.count_blocking();

        match result {
            Ok(ModuleCompletion {
                module_id,
                completed_at,
                objectives_completed,
            }) => CheckpointOutput {
                success: true,
                module_id,
                completed,
                total,
                completed_at: Some(completed_at),
                objectives_completed,
                error: None,
            },
            Err(e) => CheckpointOutput {
                success: false,
                module_id: self.engine.module().id.clone(),
                completed,
                total,
                completed_at: None,
                objectives_completed: self.engine.state().completed_objectives().len(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn format_output(&self, output: &CheckpointOutput, options: &OutputOptions) -> String {
        options.render(output, Self::format_human_readable)
    }

    fn format_human_readable(output: &CheckpointOutput) -> String {
        if output.success {
            format!(
                "Module {} completed. {} objectives achieved.\n",
                output.module_id, output.objectives_completed
            )
        } else {
            format!(
                "Checkpoint not available: {} of {} exercises completed.\n",
                output.completed, output.total
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::Module;
    use crate::evaluate::NoRunner;
    use crate::storage::MemoryStore;

    fn engine() -> ProgressionEngine<MemoryStore> {
        let module = Module::from_json(
            r#"{
                "id": "cp",
                "objectives": ["first", "second"],
                "content": [
                    {"type": "exercise", "answer": 1},
                    {"type": "exercise", "answer": 2}
                ]
            }"#,
        )
        .unwrap();
        let mut engine = ProgressionEngine::new(module, MemoryStore::new(), NoRunner, &Config::default());
        engine.ensure_consistency();
        engine
    }

    #[test]
    fn test_checkpoint_refused_early() {
        let mut engine = engine();
        engine.submit_numeric(0, "1").unwrap();

        let mut cmd = CheckpointCommand::new(&mut engine);
        let output = cmd.run();
        assert!(!output.success);
        assert_eq!((output.completed, output.total), (1, 2));
        assert!(output.error.unwrap().contains("incomplete exercises"));
        assert!(!engine.is_module_completed());
    }

    #[test]
    fn test_checkpoint_passes() {
        let mut engine = engine();
        engine.submit_numeric(0, "1").unwrap();
        engine.submit_numeric(1, "2").unwrap();

        let mut cmd = CheckpointCommand::new(&mut engine);
        let output = cmd.run();
        assert!(output.success);
        assert_eq!(output.objectives_completed, 2);
        assert!(output.completed_at.is_some());
        assert_eq!(
            cmd.format_output(&output, &OutputOptions::default()),
            "Module cp completed. 2 objectives achieved.\n"
        );
        assert!(engine.is_module_completed());
    }
}

//! Reset command for Stepgate.
//!
//! Forgets all stored progress for a module.

use serde::Serialize;

use crate::cli::OutputOptions;
use crate::core::ProgressionEngine;
use crate::evaluate::CodeRunner;
use crate::storage::KeyValueStore;

/// Output format for the reset command.
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutput {
    pub success: bool,
    pub module_id: String,
    /// Blocking sections that were completed before the reset.
    pub cleared_sections: usize,
    pub was_completed: bool,
}

/// The reset command implementation.
pub struct ResetCommand<'a, S: KeyValueStore, R: CodeRunner> {
    engine: &'a mut ProgressionEngine<S, R>,
}

impl<'a, S: KeyValueStore, R: CodeRunner> ResetCommand<'a, S, R> {
    pub fn new(engine: &'a mut ProgressionEngine<S, R>) -> Self {
        Self { engine }
    }

    pub fn run(&mut self) -> ResetOutput {
        let cleared_sections = self.engine.count_completed_blocking();
        let was_completed = self.engine.is_module_completed();
        self.engine.reset();

        ResetOutput {
            success: true,
            module_id: self.engine.module().id.clone(),
            cleared_sections,
            was_completed,
        }
    }

    pub fn format_output(&self, output: &ResetOutput, options: &OutputOptions) -> String {
        options.render(output, |o| {
            format!(
                "Progress for module {} reset ({} exercises cleared).\n",
                o.module_id, o.cleared_sections
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::Module;
    use crate::evaluate::NoRunner;
    use crate::storage::{KeyValueStore, MemoryStore, PersistedState};
    use std::sync::Arc;

    #[test]
    fn test_reset() {
        let store = Arc::new(MemoryStore::new());
        let module = Module::from_json(
            r#"{"id": "r", "content": [{"type": "exercise", "answer": 1}, {"type": "concept"}]}"#,
        )
        .unwrap();
        let mut engine =
            ProgressionEngine::new(module, Arc::clone(&store), NoRunner, &Config::default());
        engine.ensure_consistency();
        engine.submit_numeric(0, "1").unwrap();
        engine.complete_checkpoint().unwrap();

        let mut cmd = ResetCommand::new(&mut engine);
        let output = cmd.run();
        assert!(output.success);
        assert_eq!(output.cleared_sections, 1);
        assert!(output.was_completed);
        assert!(cmd
            .format_output(&output, &OutputOptions::default())
            .contains("1 exercises cleared"));

        assert!(!store.contains("module-r-completed").unwrap());
        let stored = PersistedState::new(Arc::clone(&store), "r").load().unwrap();
        assert!(stored.completed_sections.is_empty());
        assert_eq!(stored.unlocked_sections, vec![0]);
        assert!(!engine.is_unlocked(1));
    }
}

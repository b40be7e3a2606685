//! Hint and solution commands for Stepgate.

use serde::Serialize;

use crate::cli::OutputOptions;
use crate::core::ProgressionEngine;
use crate::error::{Result, StepgateError};
use crate::evaluate::CodeRunner;
use crate::storage::KeyValueStore;

/// Which auxiliary text to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealKind {
    Hint,
    Solution,
}

/// Output format for the hint and solution commands.
#[derive(Debug, Clone, Serialize)]
pub struct RevealOutput {
    pub success: bool,
    pub index: usize,
    pub kind: RevealKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The hint/solution command implementation.
pub struct RevealCommand<'a, S: KeyValueStore, R: CodeRunner> {
    engine: &'a ProgressionEngine<S, R>,
}

impl<'a, S: KeyValueStore, R: CodeRunner> RevealCommand<'a, S, R> {
    pub fn new(engine: &'a ProgressionEngine<S, R>) -> Self {
        Self { engine }
    }

    /// Show the hint or solution of an unlocked section.
    pub fn run(&self, index: usize, kind: RevealKind) -> RevealOutput {
        match self.lookup(index, kind) {
            Ok(text) => RevealOutput {
                success: text.is_some(),
                index,
                kind,
                text,
                error: None,
            },
            Err(e) => RevealOutput {
                success: false,
                index,
                kind,
                text: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn lookup(&self, index: usize, kind: RevealKind) -> Result<Option<String>> {
        let text = match kind {
            RevealKind::Hint => self.engine.hint(index)?,
            RevealKind::Solution => self.engine.solution(index)?,
        };
        if !self.engine.is_unlocked(index) {
            return Err(StepgateError::SectionLocked { index });
        }
        Ok(text.map(str::to_string))
    }

    pub fn format_output(&self, output: &RevealOutput, options: &OutputOptions) -> String {
        options.render(output, Self::format_human_readable)
    }

    fn format_human_readable(output: &RevealOutput) -> String {
        if let Some(error) = &output.error {
            return format!("Section {}: {}\n", output.index, error);
        }
        match (&output.text, output.kind) {
            (Some(text), _) => format!("{}\n", text),
            (None, RevealKind::Hint) => format!("Section {} has no hint\n", output.index),
            (None, RevealKind::Solution) => format!("Section {} has no solution\n", output.index),
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
                "id": "reveal",
                "content": [
                    {"type": "exercise-code", "hint": "use a loop", "solution": "for i in range(3): print(i)"},
                    {"type": "quiz", "hint": "think", "options": ["a"], "correct": 0}
                ]
            }"#,
        )
        .unwrap();
        let mut engine = ProgressionEngine::new(module, MemoryStore::new(), NoRunner, &Config::default());
        engine.ensure_consistency();
        engine
    }

    #[test]
    fn test_hint_and_solution() {
        let engine = engine();
        let cmd = RevealCommand::new(&engine);

        let output = cmd.run(0, RevealKind::Hint);
        assert!(output.success);
        assert_eq!(output.text.as_deref(), Some("use a loop"));

        let output = cmd.run(0, RevealKind::Solution);
        assert_eq!(output.text.as_deref(), Some("for i in range(3): print(i)"));
    }

    #[test]
    fn test_locked_section_hidden() {
        let engine = engine();
        let output = RevealCommand::new(&engine).run(1, RevealKind::Hint);
        assert!(!output.success);
        assert!(output.text.is_none());
        assert!(output.error.unwrap().contains("locked"));
    }

    #[test]
    fn test_missing_text() {
        let mut engine = engine();
        engine.complete_section(0).unwrap();
        engine.unlock_next(0).unwrap();

        let cmd = RevealCommand::new(&engine);
        let output = cmd.run(1, RevealKind::Solution);
        assert!(!output.success);
        assert!(output.error.is_none());
        assert_eq!(
            cmd.format_output(&output, &OutputOptions::default()),
            "Section 1 has no solution\n"
        );
    }

    #[test]
    fn test_out_of_range() {
        let engine = engine();
        let output = RevealCommand::new(&engine).run(9, RevealKind::Hint);
        assert!(output.error.unwrap().contains("out of range"));
    }
}

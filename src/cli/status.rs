//! Status command for Stepgate.
//!
//! Shows progress and the locked/unlocked/completed state of every section,
//! which is what a display layer polls before rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::OutputOptions;
use crate::core::{ProgressionEngine, SectionStatus};
use crate::evaluate::CodeRunner;
use crate::storage::KeyValueStore;

/// One row of the section listing.
#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub index: usize,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub blocking: bool,
    pub status: SectionStatus,
}

/// Output format for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub module_id: String,
    pub progress: u32,
    /// Blocking sections completed.
    pub completed: usize,
    /// Blocking sections in the module.
    pub total: usize,
    pub can_checkpoint: bool,
    pub module_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub objectives: Vec<String>,
    pub completed_objectives: Vec<usize>,
    pub sections: Vec<SectionView>,
}

/// The status command implementation.
pub struct StatusCommand<'a, S: KeyValueStore, R: CodeRunner> {
    engine: &'a ProgressionEngine<S, R>,
}

impl<'a, S: KeyValueStore, R: CodeRunner> StatusCommand<'a, S, R> {
    pub fn new(engine: &'a ProgressionEngine<S, R>) -> Self {
        Self { engine }
    }

    pub fn run(&self) -> StatusOutput {
        let module = self.engine.module();
        let sections = module
            .sections
            .iter()
            .zip(self.engine.statuses())
            .enumerate()
            .map(|(index, (section, status))| SectionView {
                index,
                kind: section.kind.as_str().to_string(),
                title: section.title.clone(),
                blocking: section.is_blocking(),
                status,
            })
            .collect();

        StatusOutput {
            success: true,
            module_id: module.id.clone(),
            progress: self.engine.progress(),
            completed: self.engine.count_completed_blocking(),
            total: self.engine.count_blocking(),
            can_checkpoint: self.engine.can_checkpoint(),
            module_completed: self.engine.is_module_completed(),
            completed_at: self.engine.completed_at(),
            objectives: module.objectives.clone(),
            completed_objectives: self
                .engine
                .state()
                .completed_objectives()
                .iter()
                .copied()
                .collect(),
            sections,
        }
    }

    pub fn format_output(&self, output: &StatusOutput, options: &OutputOptions) -> String {
        options.render(output, Self::format_human_readable)
    }

    fn format_human_readable(output: &StatusOutput) -> String {
        let mut text = format!(
            "Module {}: {}% ({}/{} exercises)\n",
            output.module_id, output.progress, output.completed, output.total
        );

        if output.module_completed {
            match output.completed_at {
                Some(at) => text.push_str(&format!(
                    "Completed on {}\n",
                    at.format("%Y-%m-%d %H:%M UTC")
                )),
                None => text.push_str("Completed\n"),
            }
        } else if output.can_checkpoint {
            text.push_str("All exercises done, checkpoint available\n");
        }

        text.push('\n');
        for section in &output.sections {
            let marker = match section.status {
                SectionStatus::Completed => "[x]",
                SectionStatus::Unlocked => "[ ]",
                SectionStatus::Locked => " - ",
            };
            text.push_str(&format!(
                "{} {:>3}  {:<14} {}\n",
                marker,
                section.index,
                section.kind,
                section.title.as_deref().unwrap_or("")
            ));
        }

        if !output.objectives.is_empty() {
            text.push_str("\nObjectives:\n");
            for (index, objective) in output.objectives.iter().enumerate() {
                let done = output.completed_objectives.contains(&index);
                text.push_str(&format!("{} {}\n", if done { "[x]" } else { "[ ]" }, objective));
            }
        }

        text
    }
}

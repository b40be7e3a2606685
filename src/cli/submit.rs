//! Answer, choose and run commands for Stepgate.
//!
//! Submits one attempt for a section. A correct attempt completes the section
//! and unlocks the next gate; anything else leaves progress untouched.

use serde::Serialize;

use crate::cli::OutputOptions;
use crate::core::{Activity, Attempt, ProgressionEngine};
use crate::error::StepgateError;
use crate::evaluate::{CodeRunner, ExecutionOutput, Outcome};
use crate::storage::KeyValueStore;

/// What the learner submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Typed numeric answer.
    Answer(String),
    /// Selected option, `None` when nothing was picked.
    Choose(Option<usize>),
    /// Source code for a code exercise or a sample section.
    Code(String),
}

/// Output format for the submit commands.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutput {
    /// Whether the attempt was correct, or the sample ran cleanly.
    pub success: bool,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Section unlocked for the learner to continue with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ExecutionOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitOutput {
    /// Create an output for a judged attempt.
    pub fn judged(attempt: Attempt, progress: u32) -> Self {
        Self {
            success: attempt.verdict.is_correct(),
            index: attempt.index,
            outcome: Some(attempt.verdict.outcome()),
            feedback: Some(attempt.feedback),
            next: attempt.next,
            progress,
            output: attempt.output,
            error: None,
        }
    }

    /// Create an output for an ungraded sample run.
    pub fn ran(index: usize, output: ExecutionOutput, progress: u32) -> Self {
        Self {
            success: !output.has_error(),
            index,
            outcome: None,
            feedback: None,
            next: None,
            progress,
            output: Some(output),
            error: None,
        }
    }

    /// Create a failed output.
    pub fn failure(index: usize, error: &StepgateError, progress: u32) -> Self {
        Self {
            success: false,
            index,
            outcome: None,
            feedback: None,
            next: None,
            progress,
            output: None,
            error: Some(error.to_string()),
        }
    }
}

/// The submit command implementation.
pub struct SubmitCommand<'a, S: KeyValueStore, R: CodeRunner> {
    engine: &'a mut ProgressionEngine<S, R>,
}

impl<'a, S: KeyValueStore, R: CodeRunner> SubmitCommand<'a, S, R> {
    pub fn new(engine: &'a mut ProgressionEngine<S, R>) -> Self {
        Self { engine }
    }

    /// Submit one attempt for section `index`.
    pub async fn run(&mut self, index: usize, submission: Submission) -> SubmitOutput {
        let result = match submission {
            Submission::Answer(text) => self.engine.submit_numeric(index, &text),
            Submission::Choose(selected) => self.engine.submit_choice(index, selected),
            Submission::Code(source) => {
                if self.is_sample(index) {
                    return self.run_sample(index, &source).await;
                }
                self.engine.submit_code(index, &source).await
            }
        };

        let progress = self.engine.progress();
        match result {
            Ok(attempt) => SubmitOutput::judged(attempt, progress),
            Err(e) => SubmitOutput::failure(index, &e, progress),
        }
    }

    fn is_sample(&self, index: usize) -> bool {
        self.engine
            .module()
            .section(index)
            .is_some_and(|s| matches!(s.activity, Activity::Snippet { .. }))
    }

    async fn run_sample(&self, index: usize, source: &str) -> SubmitOutput {
        let progress = self.engine.progress();
        if !self.engine.is_unlocked(index) {
            return SubmitOutput::failure(index, &StepgateError::SectionLocked { index }, progress);
        }
        match self.engine.run_snippet(source).await {
            Ok(output) => SubmitOutput::ran(index, output, progress),
            Err(e) => SubmitOutput::failure(index, &e, progress),
        }
    }

    pub fn format_output(&self, output: &SubmitOutput, options: &OutputOptions) -> String {
        options.render(output, Self::format_human_readable)
    }

    fn format_human_readable(output: &SubmitOutput) -> String {
        if let Some(error) = &output.error {
            return format!("Section {}: {}\n", output.index, error);
        }

        let mut text = String::new();
        if let Some(run) = &output.output {
            text.push_str(&run.stdout);
            if !run.stdout.is_empty() && !run.stdout.ends_with('\n') {
                text.push('\n');
            }
            if run.has_error() {
                text.push_str(&run.stderr);
                if !run.stderr.ends_with('\n') {
                    text.push('\n');
                }
            }
        }

        if let Some(feedback) = &output.feedback {
            text.push_str(feedback);
            text.push('\n');
        }

        if output.outcome == Some(Outcome::Correct) {
            text.push_str(&format!("Progress: {}%\n", output.progress));
            if let Some(next) = output.next {
                text.push_str(&format!("Continue with section {}\n", next));
            }
        }

        text
    }
}

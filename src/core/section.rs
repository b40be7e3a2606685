//! Section types and the blocking classifier.
//!
//! A section is addressed solely by its position in the module's content
//! sequence. Content authored over time names the same fields differently,
//! so raw sections are normalized once here and every other module reads the
//! canonical [`Section`] shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StepgateError};

/// Tag of a content section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Concept,
    Intuition,
    Example,
    Math,
    Warning,
    Application,
    /// Runnable code shown to the learner, not graded.
    Code,
    /// Numeric or multiple-choice exercise.
    Exercise,
    /// Code challenge judged by running the learner's code.
    ExerciseCode,
    Quiz,
    /// Tag the engine does not recognize. Renders nothing, never gates.
    Unknown(String),
}

impl SectionKind {
    /// Parse a section tag, accepting the legacy spellings of older content.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "concept" => Self::Concept,
            "intuition" => Self::Intuition,
            "example" | "exemple" => Self::Example,
            "math" | "mathematique" => Self::Math,
            "warning" => Self::Warning,
            "application" => Self::Application,
            "code" => Self::Code,
            "exercise" => Self::Exercise,
            "exercise-code" => Self::ExerciseCode,
            "quiz" => Self::Quiz,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Canonical tag for display and JSON output.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Concept => "concept",
            Self::Intuition => "intuition",
            Self::Example => "example",
            Self::Math => "math",
            Self::Warning => "warning",
            Self::Application => "application",
            Self::Code => "code",
            Self::Exercise => "exercise",
            Self::ExerciseCode => "exercise-code",
            Self::Quiz => "quiz",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether this tag must be solved before later content unlocks.
    pub fn is_blocking(&self) -> bool {
        is_blocking(self)
    }
}

/// Blocking classifier: true exactly for exercises, code exercises and quizzes.
///
/// Every unlock decision in the engine is based on this predicate.
pub fn is_blocking(kind: &SectionKind) -> bool {
    matches!(
        kind,
        SectionKind::Exercise | SectionKind::ExerciseCode | SectionKind::Quiz
    )
}

/// Expected answer of a numeric exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSpec {
    /// Expected value. `None` when the content declares no answer, in which
    /// case no submission can be judged correct.
    pub expected: Option<f64>,
    /// Accepted absolute deviation. `None` means the configured default.
    pub tolerance: Option<f64>,
}

/// Options and correct index of a multiple-choice exercise or quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceSpec {
    pub options: Vec<String>,
    pub correct: usize,
}

/// How a code exercise is judged, plus its learner-facing material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeSpec {
    pub starter_code: String,
    pub solution: Option<String>,
    /// Substring the captured output must contain.
    pub expected_output: Option<String>,
    /// Expression evaluated after the learner's code; must be truthy.
    pub validate: Option<String>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

/// What the learner does with a section.
#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    /// Informational box: read and move on.
    Read,
    /// Free-running code sample.
    Snippet {
        code: String,
        description: Option<String>,
    },
    Numeric(NumericSpec),
    Choice(ChoiceSpec),
    Quiz(ChoiceSpec),
    Code(CodeSpec),
}

/// A normalized content section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub title: Option<String>,
    /// Main text: `content`, falling back to `question` or `instruction`.
    pub body: Option<String>,
    pub icon: Option<String>,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub wrong_explanation: Option<String>,
    /// Objective index marked complete when this section is completed.
    pub completes_objective: Option<usize>,
    pub activity: Activity,
}

impl Section {
    /// Whether this section gates progression.
    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }

    /// Code the editor should be reset to: sample code or starter code.
    pub fn starter_code(&self) -> Option<&str> {
        match &self.activity {
            Activity::Snippet { code, .. } => Some(code),
            Activity::Code(spec) => Some(&spec.starter_code),
            _ => None,
        }
    }

    /// Reference solution of a code exercise, if the author provided one.
    pub fn solution(&self) -> Option<&str> {
        match &self.activity {
            Activity::Code(spec) => spec.solution.as_deref(),
            _ => None,
        }
    }
}

/// Exercise sub-kind declared by `exerciseType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
    #[default]
    Numeric,
    Mcq,
}

/// Section as authored, with every historical field name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub question: Option<String>,
    pub instruction: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub starter_code: Option<String>,
    pub solution: Option<String>,
    pub expected_output: Option<String>,
    pub validate: Option<String>,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
    pub exercise_type: Option<ExerciseType>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<Value>,
    pub answer: Option<Value>,
    pub correct: Option<Value>,
    pub tolerance: Option<f64>,
    pub hint: Option<String>,
    pub explanation: Option<String>,
    pub wrong_explanation: Option<String>,
    pub completes_objective: Option<usize>,
}

impl RawSection {
    /// Normalize into the canonical shape.
    ///
    /// `index` is only used for error messages. Shapes that cannot be judged
    /// at all (a choice without options, a correct index outside the options)
    /// are rejected; unknown tags are logged and kept as non-blocking.
    pub fn normalize(self, index: usize) -> Result<Section> {
        let kind = SectionKind::from_tag(&self.kind);
        if let SectionKind::Unknown(tag) = &kind {
            let err = StepgateError::unknown_section_type(tag.clone());
            tracing::warn!("section {}: {} (rendered as empty)", index, err);
        }

        let activity = match &kind {
            SectionKind::Code => Activity::Snippet {
                code: self.code.clone().unwrap_or_default(),
                description: self.description.clone(),
            },
            SectionKind::Exercise => match self.exercise_type.unwrap_or_default() {
                ExerciseType::Numeric => Activity::Numeric(self.numeric_spec(index)),
                ExerciseType::Mcq => Activity::Choice(self.choice_spec(index)?),
            },
            SectionKind::Quiz => Activity::Quiz(self.choice_spec(index)?),
            SectionKind::ExerciseCode => Activity::Code(CodeSpec {
                starter_code: self.starter_code.clone().unwrap_or_default(),
                solution: self.solution.clone(),
                expected_output: self.expected_output.clone().filter(|s| !s.is_empty()),
                validate: self.validate.clone().filter(|s| !s.trim().is_empty()),
                success_message: self.success_message.clone(),
                error_message: self.error_message.clone(),
            }),
            _ => Activity::Read,
        };

        Ok(Section {
            kind,
            title: self.title,
            body: self.content.or(self.question).or(self.instruction),
            icon: self.icon,
            hint: self.hint,
            explanation: self.explanation,
            wrong_explanation: self.wrong_explanation,
            completes_objective: self.completes_objective,
            activity,
        })
    }

    fn numeric_spec(&self, index: usize) -> NumericSpec {
        let expected = first_present(&self.correct_answer, &self.answer).and_then(value_as_f64);
        if expected.is_none() {
            tracing::warn!(
                "section {}: numeric exercise declares no usable answer",
                index
            );
        }
        NumericSpec {
            expected,
            tolerance: self.tolerance,
        }
    }

    fn choice_spec(&self, index: usize) -> Result<ChoiceSpec> {
        let options = self.options.clone().unwrap_or_default();
        if options.is_empty() {
            return Err(StepgateError::invalid_module(format!(
                "section {} ({}) has no options",
                index, self.kind
            )));
        }

        let correct = first_present(&self.correct_answer, &self.correct)
            .and_then(value_as_index)
            .ok_or_else(|| {
                StepgateError::invalid_module(format!(
                    "section {} ({}) declares no correct option",
                    index, self.kind
                ))
            })?;

        if correct >= options.len() {
            return Err(StepgateError::invalid_module(format!(
                "section {} ({}) marks option {} correct but has {} options",
                index,
                self.kind,
                correct,
                options.len()
            )));
        }

        Ok(ChoiceSpec { options, correct })
    }
}

/// The newer field name wins when both are present.
fn first_present<'a>(preferred: &'a Option<Value>, legacy: &'a Option<Value>) -> Option<&'a Value> {
    preferred.as_ref().or(legacy.as_ref())
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn value_as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

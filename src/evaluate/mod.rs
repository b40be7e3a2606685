//! Exercise judges.
//!
//! Stateless functions deciding whether an attempt passes. Each returns a
//! tri-state [`Verdict`]: an `Invalid` verdict means the attempt could not be
//! judged at all (nothing selected, unparseable number) and must not be
//! reported or treated as a wrong answer.

pub mod runner;

pub use runner::{CodeRunner, ExecutionOutput, NoRunner, ProcessRunner};

use serde::{Deserialize, Serialize};

use crate::core::section::{ChoiceSpec, CodeSpec, NumericSpec};
use crate::error::StepgateError;

/// Tolerance applied when a numeric exercise declares none.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Why an attempt could not be judged.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidAnswer {
    /// The numeric answer is not a number.
    InvalidInput { input: String },
    /// No option was selected.
    NoSelection,
}

/// Why an attempt was judged wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// Numeric answer outside the tolerance.
    WrongValue { given: f64 },
    /// The content declares no expected value to compare against.
    NoExpectedValue,
    /// Selected option is not the correct one.
    WrongOption { selected: usize },
    /// Code ran but its output lacks the expected substring.
    MissingOutput { expected: String },
    /// Code ran but the validator expression was falsy.
    ValidationFailed,
    /// The interpreter raised or wrote to stderr.
    ExecutionFailed { message: String },
}

/// Outcome of judging one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Correct,
    Incorrect(Mismatch),
    Invalid(InvalidAnswer),
}

/// The three outcomes without their details, for output and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Incorrect,
    Invalid,
}

impl Verdict {
    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::Correct)
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            Verdict::Correct => Outcome::Correct,
            Verdict::Incorrect(_) => Outcome::Incorrect,
            Verdict::Invalid(_) => Outcome::Invalid,
        }
    }

    /// Error value for verdicts that map onto the error taxonomy.
    pub fn error(&self) -> Option<StepgateError> {
        match self {
            Verdict::Invalid(invalid) => Some(invalid.clone().into()),
            Verdict::Incorrect(Mismatch::ExecutionFailed { message }) => {
                Some(StepgateError::execution_failed(message.clone()))
            }
            _ => None,
        }
    }
}

impl From<InvalidAnswer> for StepgateError {
    fn from(invalid: InvalidAnswer) -> Self {
        match invalid {
            InvalidAnswer::InvalidInput { input } => StepgateError::InvalidInput { input },
            InvalidAnswer::NoSelection => StepgateError::NoSelection,
        }
    }
}

/// Parse a learner's decimal number, accepting `,` as the decimal separator.
///
/// Only the first `,` is treated as a separator.
pub fn parse_decimal(input: &str) -> Option<f64> {
    let normalized = input.trim().replacen(',', ".", 1);
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Judge a numeric answer.
pub fn judge_numeric(spec: &NumericSpec, input: &str, default_tolerance: f64) -> Verdict {
    let Some(value) = parse_decimal(input) else {
        return Verdict::Invalid(InvalidAnswer::InvalidInput {
            input: input.to_string(),
        });
    };

    let Some(expected) = spec.expected else {
        return Verdict::Incorrect(Mismatch::NoExpectedValue);
    };

    let tolerance = spec.tolerance.unwrap_or(default_tolerance);
    if (value - expected).abs() <= tolerance {
        Verdict::Correct
    } else {
        Verdict::Incorrect(Mismatch::WrongValue { given: value })
    }
}

/// Judge a multiple-choice exercise.
pub fn judge_choice(spec: &ChoiceSpec, selected: Option<usize>) -> Verdict {
    match selected {
        None => Verdict::Invalid(InvalidAnswer::NoSelection),
        Some(option) if option == spec.correct => Verdict::Correct,
        Some(option) => Verdict::Incorrect(Mismatch::WrongOption { selected: option }),
    }
}

/// Judge a quiz. Same contract as [`judge_choice`].
pub fn judge_quiz(spec: &ChoiceSpec, selected: Option<usize>) -> Verdict {
    judge_choice(spec, selected)
}

/// Verdict of a code exercise plus the captured output, if the code ran.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeJudgement {
    pub verdict: Verdict,
    pub output: Option<ExecutionOutput>,
}

/// Run the learner's code and judge it.
///
/// An execution error fails the attempt outright. Otherwise the expected
/// output substring decides if declared, then the validator expression, and
/// with neither a clean run passes.
pub async fn judge_code<R>(spec: &CodeSpec, source: &str, runner: &R) -> CodeJudgement
where
    R: CodeRunner + ?Sized,
{
    let output = match runner.run(source).await {
        Ok(output) => output,
        Err(err) => {
            return CodeJudgement {
                verdict: Verdict::Incorrect(Mismatch::ExecutionFailed {
                    message: err.to_string(),
                }),
                output: None,
            }
        }
    };

    if output.has_error() {
        return CodeJudgement {
            verdict: Verdict::Incorrect(Mismatch::ExecutionFailed {
                message: output.stderr.trim().to_string(),
            }),
            output: Some(output),
        };
    }

    let verdict = if let Some(expected) = &spec.expected_output {
        if output.stdout.contains(expected.as_str()) {
            Verdict::Correct
        } else {
            Verdict::Incorrect(Mismatch::MissingOutput {
                expected: expected.clone(),
            })
        }
    } else if let Some(expression) = &spec.validate {
        match runner.evaluate(source, expression).await {
            Ok(true) => Verdict::Correct,
            Ok(false) => Verdict::Incorrect(Mismatch::ValidationFailed),
            Err(err) => Verdict::Incorrect(Mismatch::ExecutionFailed {
                message: err.to_string(),
            }),
        }
    } else {
        Verdict::Correct
    };

    CodeJudgement {
        verdict,
        output: Some(output),
    }
}

//! Code execution collaborators.
//!
//! The engine never runs learner code itself. It hands source text to a
//! [`CodeRunner`] and judges the captured output. Runs have no timeout: a
//! hung interpreter blocks the submitting section until it returns.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::RunnerConfig;
use crate::error::{Result, StepgateError};

/// Captured result of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Rendered figure, base64-encoded PNG.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl ExecutionOutput {
    /// Output with only stdout.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            ..Default::default()
        }
    }

    /// Whether the run wrote anything meaningful to stderr.
    pub fn has_error(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// Sandboxed interpreter the engine delegates code to.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `source` and capture its output.
    ///
    /// Returns `ExecutionFailed` when the interpreter raised or could not be
    /// started.
    async fn run(&self, source: &str) -> Result<ExecutionOutput>;

    /// Run `source`, then evaluate `expression` in the same session and
    /// report whether it was truthy.
    async fn evaluate(&self, source: &str, expression: &str) -> Result<bool>;
}

/// Runner used when no interpreter is configured. Every run fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRunner;

#[async_trait]
impl CodeRunner for NoRunner {
    async fn run(&self, _source: &str) -> Result<ExecutionOutput> {
        Err(StepgateError::execution_failed(
            "no code runner is configured",
        ))
    }

    async fn evaluate(&self, _source: &str, _expression: &str) -> Result<bool> {
        Err(StepgateError::execution_failed(
            "no code runner is configured",
        ))
    }
}

/// Runs code in a local interpreter process, feeding the source on stdin.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    validate_template: String,
}

impl ProcessRunner {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        validate_template: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            validate_template: validate_template.into(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.validate_template.clone(),
        )
    }

    /// Source that runs `source` and prints the truthiness of `expression`.
    fn validation_script(&self, source: &str, expression: &str) -> String {
        format!(
            "{}\n{}\n",
            source,
            self.validate_template.replace("{expression}", expression)
        )
    }
}

#[async_trait]
impl CodeRunner for ProcessRunner {
    async fn run(&self, source: &str) -> Result<ExecutionOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            StepgateError::execution_failed(format!("failed to start {}: {}", self.program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(source.as_bytes()).await.map_err(|e| {
                StepgateError::execution_failed(format!("failed to send source: {}", e))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            StepgateError::execution_failed(format!("failed to collect output: {}", e))
        })?;

        let result = ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            image_base64: None,
        };

        if !output.status.success() && !result.has_error() {
            return Err(StepgateError::execution_failed(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        Ok(result)
    }

    async fn evaluate(&self, source: &str, expression: &str) -> Result<bool> {
        let output = self.run(&self.validation_script(source, expression)).await?;
        if output.has_error() {
            return Err(StepgateError::execution_failed(output.stderr.trim()));
        }

        let last = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");
        Ok(matches!(last, "True" | "true" | "1"))
    }
}

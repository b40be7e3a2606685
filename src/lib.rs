//! Stepgate - progression gate for guided learning modules
//!
//! Stepgate decides which sections of a self-paced module a learner may see,
//! judges exercise attempts, cascades unlocking after each success, and keeps
//! the progression state in a key-value store across reloads.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod evaluate;
pub mod storage;
pub mod util;

pub use config::Config;
pub use core::{
    is_blocking, Attempt, CheckpointGate, Module, ModuleCompletion, ObjectiveTracker,
    ProgressionEngine, ProgressionState, Section, SectionKind, SectionStatus, Snapshot,
};
pub use error::{FailOpen, Result, StepgateError};
pub use evaluate::{
    judge_choice, judge_code, judge_numeric, judge_quiz, CodeRunner, ExecutionOutput, NoRunner,
    Outcome, ProcessRunner, Verdict,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, PersistedState};

// CLI commands
pub use cli::{CheckpointCommand, ResetCommand, RevealCommand, StatusCommand, SubmitCommand};

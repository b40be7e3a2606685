//! Core types and logic for Stepgate.
//!
//! This module contains the section data model, the progression state and
//! the engine that owns every unlock and completion transition.

pub mod checkpoint;
pub mod engine;
pub mod module;
pub mod objectives;
pub mod section;
pub mod state;

pub use checkpoint::CheckpointGate;
pub use engine::{Attempt, ModuleCompletion, ProgressionEngine};
pub use module::{Module, ModuleDefinition};
pub use objectives::ObjectiveTracker;
pub use section::{
    is_blocking, Activity, ChoiceSpec, CodeSpec, ExerciseType, NumericSpec, RawSection, Section,
    SectionKind,
};
pub use state::{derive_progress, ProgressionState, SectionStatus, Snapshot};

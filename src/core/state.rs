//! Progression state and its persisted snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::module::Module;

/// Persisted form of a module's progression, as stored under the module's
/// data key.
///
/// The field names are part of the storage format and must not change.
/// `progress` is a cache of the derived value; it is recomputed on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub completed_objectives: Vec<usize>,
    #[serde(default)]
    pub completed_sections: Vec<usize>,
    #[serde(default = "default_unlocked")]
    pub unlocked_sections: Vec<usize>,
}

fn default_unlocked() -> Vec<usize> {
    vec![0]
}

impl Default for Snapshot {
    fn default() -> Self {
        ProgressionState::default().to_snapshot()
    }
}

/// Per-module progression.
///
/// All three sets only grow; the engine is the only writer. Index 0 is
/// always unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionState {
    pub(crate) unlocked: BTreeSet<usize>,
    pub(crate) completed: BTreeSet<usize>,
    pub(crate) objectives: BTreeSet<usize>,
    pub(crate) progress: u32,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self {
            unlocked: BTreeSet::from([0]),
            completed: BTreeSet::new(),
            objectives: BTreeSet::new(),
            progress: 0,
        }
    }
}

impl ProgressionState {
    /// Restore state from a snapshot. Index 0 is re-added if missing.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut unlocked: BTreeSet<usize> = snapshot.unlocked_sections.into_iter().collect();
        unlocked.insert(0);
        Self {
            unlocked,
            completed: snapshot.completed_sections.into_iter().collect(),
            objectives: snapshot.completed_objectives.into_iter().collect(),
            progress: snapshot.progress.min(100),
        }
    }

    /// Snapshot with every set in ascending order.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            progress: self.progress,
            completed_objectives: self.objectives.iter().copied().collect(),
            completed_sections: self.completed.iter().copied().collect(),
            unlocked_sections: self.unlocked.iter().copied().collect(),
        }
    }

    pub fn unlocked_sections(&self) -> &BTreeSet<usize> {
        &self.unlocked
    }

    pub fn completed_sections(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    pub fn completed_objectives(&self) -> &BTreeSet<usize> {
        &self.objectives
    }

    /// Cached progress percentage.
    pub fn progress(&self) -> u32 {
        self.progress
    }

    /// Completed sections that exist in `module` and are blocking.
    ///
    /// Stale indices left by an older revision of the content are not counted.
    pub fn count_completed_blocking(&self, module: &Module) -> usize {
        self.completed
            .iter()
            .filter(|&&i| module.is_blocking(i))
            .count()
    }
}

/// Progress percentage: `round(100 * completed / total)`, or 100 when the
/// module has nothing to solve. Halves round up.
pub fn derive_progress(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((200 * completed + total) / (2 * total)) as u32
}

/// How the display layer should render a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Blocking section not reached yet.
    Locked,
    /// Visible and, for blocking sections, interactive.
    Unlocked,
    /// Blocking section solved.
    Completed,
}

impl SectionStatus {
    /// Whether the learner can interact with the section.
    pub fn is_open(&self) -> bool {
        !matches!(self, SectionStatus::Locked)
    }
}

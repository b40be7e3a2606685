//! Learning objective tracking.

use std::collections::BTreeSet;

/// Marks learning objectives complete.
///
/// Objectives are independent of sections except through a section's
/// `completes_objective` link. Indices past the module's objective list are
/// ignored.
#[derive(Debug)]
pub struct ObjectiveTracker<'a> {
    completed: &'a mut BTreeSet<usize>,
    total: usize,
}

impl<'a> ObjectiveTracker<'a> {
    pub fn new(completed: &'a mut BTreeSet<usize>, total: usize) -> Self {
        Self { completed, total }
    }

    /// Mark one objective complete. Returns whether it was newly completed.
    pub fn complete(&mut self, index: usize) -> bool {
        if index >= self.total {
            tracing::warn!(
                "objective {} does not exist ({} objectives)",
                index,
                self.total
            );
            return false;
        }
        let added = self.completed.insert(index);
        if added {
            tracing::debug!("objective {} completed", index);
        }
        added
    }

    /// Mark every objective complete. Returns how many were newly completed.
    pub fn complete_all(&mut self) -> usize {
        (0..self.total).filter(|&i| self.completed.insert(i)).count()
    }

    pub fn is_complete(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Whether every objective is complete.
    pub fn all_complete(&self) -> bool {
        (0..self.total).all(|i| self.completed.contains(&i))
    }
}

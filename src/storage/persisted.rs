//! Per-module snapshot persistence.
//!
//! Serialization only, no progression policy. Storage failures are logged
//! and swallowed: the session carries on in memory and simply does not
//! survive a reload.

use chrono::{DateTime, Utc};

use crate::core::state::Snapshot;
use crate::error::{FailOpen, Result};
use crate::storage::KeyValueStore;

/// Prefix used for storage keys unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "module";

/// Value written by older hosts for the completed flag.
const LEGACY_COMPLETED: &str = "true";

/// Snapshot and completed flag of one module in a key-value store.
#[derive(Debug)]
pub struct PersistedState<S: KeyValueStore> {
    store: S,
    data_key: String,
    completed_key: String,
}

impl<S: KeyValueStore> PersistedState<S> {
    /// Keys `module-{id}-data` and `module-{id}-completed`.
    pub fn new(store: S, module_id: &str) -> Self {
        Self::with_prefix(store, DEFAULT_KEY_PREFIX, module_id)
    }

    /// Keys `{prefix}-{id}-data` and `{prefix}-{id}-completed`.
    pub fn with_prefix(store: S, prefix: &str, module_id: &str) -> Self {
        Self {
            store,
            data_key: format!("{}-{}-data", prefix, module_id),
            completed_key: format!("{}-{}-completed", prefix, module_id),
        }
    }

    pub fn data_key(&self) -> &str {
        &self.data_key
    }

    pub fn completed_key(&self) -> &str {
        &self.completed_key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the snapshot, propagating storage and parse errors.
    pub fn try_load(&self) -> Result<Option<Snapshot>> {
        match self.store.get(&self.data_key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Read the snapshot. Unreadable or malformed snapshots count as absent.
    pub fn load(&self) -> Option<Snapshot> {
        self.try_load()
            .fail_open_default(&format!("loading snapshot {}", self.data_key))
    }

    /// Write the snapshot, propagating storage errors.
    pub fn try_save(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set(&self.data_key, &json)
    }

    /// Write the snapshot. Returns whether it reached the store.
    pub fn save(&self, snapshot: &Snapshot) -> bool {
        self.try_save(snapshot)
            .map(|_| true)
            .fail_open_with(&format!("saving snapshot {}", self.data_key), false)
    }

    /// Record that the module's checkpoint was passed at `at`.
    pub fn mark_completed(&self, at: DateTime<Utc>) -> bool {
        self.store
            .set(&self.completed_key, &at.to_rfc3339())
            .map(|_| true)
            .fail_open_with(
                &format!("saving completed flag {}", self.completed_key),
                false,
            )
    }

    /// Whether the completed flag is set.
    pub fn is_completed(&self) -> bool {
        self.completed_flag().is_some()
    }

    /// When the checkpoint was passed. `None` if not completed or if the
    /// flag predates timestamps.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        let value = self.completed_flag()?;
        if value == LEGACY_COMPLETED {
            return None;
        }
        DateTime::parse_from_rfc3339(&value)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }

    fn completed_flag(&self) -> Option<String> {
        self.store
            .get(&self.completed_key)
            .fail_open_default(&format!("reading completed flag {}", self.completed_key))
            .filter(|v| !v.is_empty())
    }

    /// Remove the snapshot and the completed flag.
    pub fn clear(&self) {
        self.store
            .remove(&self.data_key)
            .fail_open_default(&format!("removing {}", self.data_key));
        self.store
            .remove(&self.completed_key)
            .fail_open_default(&format!("removing {}", self.completed_key));
    }
}

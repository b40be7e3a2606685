//! Key-value persistence surface.

use std::sync::Arc;

use crate::error::Result;

/// String key-value store the progression snapshot is written to.
///
/// Writes must be durable by the time `set` returns. Implementations use
/// interior mutability so one store can be shared between engines.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns `Ok(())` even if the key is absent.
    fn remove(&self, key: &str) -> Result<()>;

    /// Check if a key is present.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Lets tests keep a handle on a store they gave to an engine.
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

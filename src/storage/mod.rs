//! Persistence for Stepgate.
//!
//! The host provides a string key-value surface ([`KeyValueStore`]);
//! [`PersistedState`] layers the per-module snapshot and completed flag on
//! top of it.

pub mod file;
pub mod memory;
pub mod persisted;
pub mod traits;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use persisted::{PersistedState, DEFAULT_KEY_PREFIX};
pub use traits::KeyValueStore;

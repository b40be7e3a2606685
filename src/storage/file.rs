//! File-based key-value store.
//!
//! Each key is one file in the store directory (`~/.stepgate/progress/` by
//! default), named after the key with unsafe bytes percent-encoded. Writes go
//! to a temp file that is renamed over the target.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::config::progress_dir;
use crate::error::{Result, StepgateError};
use crate::storage::KeyValueStore;
use crate::util::{read_to_string_with_limit, MAX_VALUE_SIZE};

/// File-backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store in the default progress directory.
    pub fn new() -> Result<Self> {
        let dir = progress_dir().ok_or_else(|| {
            StepgateError::config("Could not determine progress directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// Create a store in `dir`, creating the directory if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| StepgateError::storage(&dir, e))?;
        }
        Ok(Self { dir })
    }

    /// Directory holding the value files.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn value_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_stem(key)?)))
    }

    fn temp_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!(".{}.json.tmp", file_stem(key)?)))
    }
}

/// Map a key to a file name stem.
///
/// ASCII alphanumerics, `-` and `_` pass through, as does `.` anywhere but
/// the first position. Every other byte becomes `%XX`, so distinct keys
/// never share a file and no key can leave the store directory.
fn file_stem(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(StepgateError::storage(
            key,
            io::Error::new(io::ErrorKind::InvalidInput, "empty storage key"),
        ));
    }

    let mut stem = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let safe = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_')
            || (byte == b'.' && i > 0);
        if safe {
            stem.push(char::from(byte));
        } else {
            stem.push('%');
            stem.push_str(&hex::encode_upper([byte]));
        }
    }
    Ok(stem)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.value_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        read_to_string_with_limit(&path, MAX_VALUE_SIZE).map(Some)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let final_path = self.value_path(key)?;
        let temp_path = self.temp_path(key)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| StepgateError::storage(&temp_path, e))?;
            file.write_all(value.as_bytes())
                .map_err(|e| StepgateError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| StepgateError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| StepgateError::storage(&final_path, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.value_path(key)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StepgateError::storage(&path, e))?;
        }

        let temp_path = self.temp_path(key)?;
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }

        Ok(())
    }
}

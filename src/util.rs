//! File helpers shared by the module loader and the file store.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, StepgateError};

/// Largest module definition accepted (4 MB). Definitions embed HTML and
/// starter code but never binary payloads.
pub const MAX_MODULE_SIZE: u64 = 4 * 1024 * 1024;

/// Largest value the file store will read back (1 MB).
pub const MAX_VALUE_SIZE: u64 = 1024 * 1024;

/// Read a module definition, refusing files over [`MAX_MODULE_SIZE`].
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_MODULE_SIZE)
}

/// Read a file into a string, refusing files larger than `max_size` bytes.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let size = fs::metadata(path)
        .map_err(|e| StepgateError::storage(path, e))?
        .len();

    if size > max_size {
        return Err(StepgateError::storage(
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file is too large ({} bytes, max {} bytes)", size, max_size),
            ),
        ));
    }

    fs::read_to_string(path).map_err(|e| StepgateError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_within_limit() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("module.json");
        fs::write(&path, "{}").unwrap();

        assert_eq!(read_to_string_limited(&path).unwrap(), "{}");
    }

    #[test]
    fn test_read_nonexistent() {
        let temp = TempDir::new().unwrap();
        let err = read_to_string_limited(&temp.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_read_at_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boundary.json");
        fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_to_string_with_limit(&path, 100).is_ok());

        let err = read_to_string_with_limit(&path, 99).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("100 bytes"));
    }
}

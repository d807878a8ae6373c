//! Atomic file writes.
//!
//! Implements atomic writes using:
//! 1. Write to a uniquely named temp file in the target directory
//! 2. fsync to ensure data reaches disk
//! 3. Atomic rename to the target path
//!
//! Readers never observe a partially written target.

use crate::{Result, TextcloudError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::debug;

/// Read a whole file.
///
/// Returns `None` if the file doesn't exist.
pub fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TextcloudError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        }),
    }
}

/// Create `dir` and its parents if missing. Safe to call concurrently.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| TextcloudError::Io {
        message: format!("Failed to create directory {}", dir.display()),
        path: Some(dir.to_path_buf()),
        source: Some(e),
    })
}

/// Write bytes to `path` atomically, creating parent directories as needed.
///
/// An existing file at `path` is replaced.
pub fn atomic_write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| TextcloudError::Io {
        message: format!("{} has no parent directory", path.display()),
        path: Some(path.to_path_buf()),
        source: None,
    })?;
    ensure_dir(parent)?;

    // Temp file lives next to the target so the rename stays on one filesystem
    let mut temp = tempfile::Builder::new()
        .prefix(".incoming-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| TextcloudError::Io {
            message: format!("Failed to create temp file in {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;

    temp.write_all(data).map_err(|e| TextcloudError::Io {
        message: format!("Failed to write temp file {}", temp.path().display()),
        path: Some(temp.path().to_path_buf()),
        source: Some(e),
    })?;

    temp.as_file().sync_all().map_err(|e| TextcloudError::Io {
        message: format!("Failed to sync temp file {}", temp.path().display()),
        path: Some(temp.path().to_path_buf()),
        source: Some(e),
    })?;

    // Dropping the handle on error removes the temp file
    temp.persist(path).map_err(|e| TextcloudError::Io {
        message: format!(
            "Failed to rename {} to {}",
            e.file.path().display(),
            path.display()
        ),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Atomically wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");

        atomic_write_bytes(&path, b"payload").unwrap();
        assert_eq!(read_bytes(&path).unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");

        atomic_write_bytes(&path, b"first").unwrap();
        atomic_write_bytes(&path, b"second").unwrap();
        assert_eq!(read_bytes(&path).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("blob");

        atomic_write_bytes(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");
        atomic_write_bytes(&path, b"x").unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["blob".to_string()]);
    }

    #[test]
    fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_bytes(&temp_dir.path().join("missing")).unwrap().is_none());
    }
}

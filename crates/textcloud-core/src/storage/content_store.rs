//! Content-addressed blob store.
//!
//! Blobs are laid out as `{root}/{hash[..2]}/{hash}`. The location is a pure
//! function of the digest, so identical content always resolves to the same
//! path without a lookup, and concurrent writers of different content never
//! touch the same file. Writes of identical content race harmlessly: the
//! bytes are the same, so whichever rename lands last wins.

use crate::config::StorageConfig;
use crate::error::{Result, TextcloudError};
use crate::storage::atomic::{atomic_write_bytes, ensure_dir, read_bytes};
use crate::storage::hashing::{ensure_sha256_hex, is_sha256_hex, sha256_hex};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a [`ContentStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// SHA256 digest of the content (lowercase hex).
    pub hash: String,
    /// Storage-relative location, always `/`-separated.
    pub location: String,
    pub size_bytes: u64,
    /// `false` when the blob was already present and nothing was written.
    pub newly_written: bool,
}

/// Filesystem-backed content-addressed store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: Arc<PathBuf>,
}

impl ContentStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir(&root)?;
        info!("Content store rooted at {}", root.display());
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic storage location for a digest.
    pub fn location_for(hash: &str) -> Result<String> {
        let hash = ensure_sha256_hex(hash)?;
        let prefix = &hash[..StorageConfig::SHARD_PREFIX_LEN];
        Ok(format!("{}/{}", prefix, hash))
    }

    /// Map a location back to a path under the root, rejecting anything that
    /// is not of the exact shape produced by [`Self::location_for`].
    fn resolve(&self, location: &str) -> Result<PathBuf> {
        let invalid = || TextcloudError::invalid("location", format!("Malformed blob location: {}", location));

        let (prefix, hash) = location.split_once('/').ok_or_else(invalid)?;
        if !is_sha256_hex(hash) || prefix != &hash[..StorageConfig::SHARD_PREFIX_LEN] {
            return Err(invalid());
        }
        Ok(self.root.join(prefix).join(hash))
    }

    /// Check whether a blob exists at `location`.
    pub fn contains(&self, location: &str) -> bool {
        self.resolve(location).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Hash `data` and store it if absent.
    pub async fn put(&self, data: Bytes) -> Result<StoredBlob> {
        let hash = sha256_hex(&data);
        self.put_with_digest(hash, data).await
    }

    /// Store `data` under a digest the caller already computed with
    /// [`sha256_hex`]. Idempotent: an existing blob is left untouched.
    pub async fn put_with_digest(&self, hash: String, data: Bytes) -> Result<StoredBlob> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.put_blocking(hash, &data))
            .await
            .map_err(|e| TextcloudError::Other(format!("Blob write task failed: {}", e)))?
    }

    fn put_blocking(&self, hash: String, data: &[u8]) -> Result<StoredBlob> {
        debug_assert_eq!(hash, sha256_hex(data));

        let location = Self::location_for(&hash)?;
        let path = self.resolve(&location)?;
        let size_bytes = data.len() as u64;

        if path.is_file() {
            debug!("Blob {} already present, skipping write", location);
            return Ok(StoredBlob {
                hash,
                location,
                size_bytes,
                newly_written: false,
            });
        }

        atomic_write_bytes(&path, data)?;
        info!("Stored blob {} ({} bytes)", location, size_bytes);

        Ok(StoredBlob {
            hash,
            location,
            size_bytes,
            newly_written: true,
        })
    }

    /// Read a blob.
    ///
    /// A missing blob is reported as [`TextcloudError::BlobNotFound`]: callers
    /// only hold locations taken from metadata rows, so absence means the
    /// store and the registry disagree.
    pub async fn get(&self, location: &str) -> Result<Bytes> {
        let path = self.resolve(location)?;
        let location = location.to_string();

        tokio::task::spawn_blocking(move || match read_bytes(&path)? {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(TextcloudError::BlobNotFound { location }),
        })
        .await
        .map_err(|e| TextcloudError::Other(format!("Blob read task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_blobs(root: &Path) -> usize {
        walk(root)
            .into_iter()
            .filter(|p| !p.file_name().unwrap().to_string_lossy().starts_with('.'))
            .count()
    }

    fn walk(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(walk(&path));
            } else {
                files.push(path);
            }
        }
        files
    }

    #[test]
    fn test_location_is_sharded_by_prefix() {
        let hash = sha256_hex(b"hello");
        let location = ContentStore::location_for(&hash).unwrap();
        assert_eq!(location, format!("{}/{}", &hash[..2], hash));
    }

    #[test]
    fn test_location_rejects_non_digest() {
        assert!(ContentStore::location_for("../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path().join("blobs")).unwrap();

        let blob = store.put(Bytes::from_static(b"some text")).await.unwrap();
        assert!(blob.newly_written);
        assert_eq!(blob.size_bytes, 9);
        assert_eq!(blob.hash, sha256_hex(b"some text"));

        let data = store.get(&blob.location).await.unwrap();
        assert_eq!(&data[..], b"some text");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path()).unwrap();

        let first = store.put(Bytes::from_static(b"dup")).await.unwrap();
        let second = store.put(Bytes::from_static(b"dup")).await.unwrap();

        assert_eq!(first.hash, second.hash);
        assert_eq!(first.location, second.location);
        assert!(first.newly_written);
        assert!(!second.newly_written);
        assert_eq!(count_blobs(temp_dir.path()), 1);
    }

    #[tokio::test]
    async fn test_distinct_content_distinct_locations() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path()).unwrap();

        let a = store.put(Bytes::from_static(b"a")).await.unwrap();
        let b = store.put(Bytes::from_static(b"b")).await.unwrap();
        assert_ne!(a.location, b.location);
        assert_eq!(count_blobs(temp_dir.path()), 2);
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_inconsistency() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path()).unwrap();
        let location = ContentStore::location_for(&sha256_hex(b"never stored")).unwrap();

        let err = store.get(&location).await.unwrap_err();
        assert!(matches!(err, TextcloudError::BlobNotFound { .. }));
        assert!(!store.contains(&location));
    }

    #[tokio::test]
    async fn test_get_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path()).unwrap();

        let err = store.get("../outside").await.unwrap_err();
        assert!(matches!(err, TextcloudError::InvalidInput { .. }));

        let hash = sha256_hex(b"x");
        let mismatched = format!("zz/{}", hash);
        assert!(store.get(&mismatched).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_identical_puts() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::open(temp_dir.path()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(Bytes::from_static(b"same bytes")).await
            }));
        }
        let mut locations = Vec::new();
        for handle in handles {
            locations.push(handle.await.unwrap().unwrap().location);
        }

        locations.dedup();
        assert_eq!(locations.len(), 1);
        assert_eq!(count_blobs(temp_dir.path()), 1);
        assert_eq!(&store.get(&locations[0]).await.unwrap()[..], b"same bytes");
    }
}

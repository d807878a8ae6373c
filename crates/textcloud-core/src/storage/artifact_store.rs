//! Storage for rendered analysis artifacts.
//!
//! Artifacts are flat files named `{analysis_id}_{stem}_wordcloud.png`. The
//! analysis id prefix keeps concurrent runs on distinct paths.

use crate::config::AnalysisConfig;
use crate::error::{Result, TextcloudError};
use crate::storage::atomic::{atomic_write_bytes, read_bytes};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Directory of rendered artifacts. The directory is created on first save.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: Arc<PathBuf>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name under which the artifact of `analysis_id` is stored.
    ///
    /// The stem is the original filename's last path component up to its
    /// first `.`, with anything outside `[A-Za-z0-9_-]` replaced by `_`.
    pub fn artifact_name(analysis_id: Uuid, original_filename: &str) -> String {
        let base = original_filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let stem: String = base
            .split('.')
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = if stem.is_empty() { "file".to_string() } else { stem };

        format!("{}_{}{}", analysis_id, stem, AnalysisConfig::ARTIFACT_SUFFIX)
    }

    /// Reject names that could escape the artifact directory.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains("..") || name.contains(['/', '\\', '\0']) {
            return Err(TextcloudError::invalid("filename", "Invalid filename or path."));
        }
        Ok(())
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.dir.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Persist artifact bytes atomically.
    pub async fn save(&self, name: &str, data: Bytes) -> Result<PathBuf> {
        let path = self.path_of(name)?;
        let target = path.clone();

        tokio::task::spawn_blocking(move || atomic_write_bytes(&target, &data))
            .await
            .map_err(|e| TextcloudError::Other(format!("Artifact write task failed: {}", e)))??;

        debug!("Saved artifact {}", path.display());
        Ok(path)
    }

    pub async fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.path_of(name)?;
        let filename = name.to_string();

        tokio::task::spawn_blocking(move || match read_bytes(&path)? {
            Some(data) => Ok(Bytes::from(data)),
            None => Err(TextcloudError::ArtifactMissing { filename }),
        })
        .await
        .map_err(|e| TextcloudError::Other(format!("Artifact read task failed: {}", e)))?
    }
}

//! File storage service facade.

use crate::config::{StorageConfig, StorageSettings};
use crate::models::{AnalysisRequest, FileMetadata, NewFile};
use crate::network::HttpAnalysisNotifier;
use crate::registry::FileRegistry;
use crate::storage::{sha256_hex, ContentStore};
use crate::tasks::{TaskHandler, TaskQueue};
use crate::{Result, TextcloudError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Result of an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub metadata: FileMetadata,
    /// `false` when the content was already stored and the existing record is returned.
    pub created: bool,
}

/// Upload, download and metadata lookup over the content store and registry.
pub struct StorageApi {
    settings: StorageSettings,
    store: ContentStore,
    registry: FileRegistry,
    notifications: Option<TaskQueue<AnalysisRequest>>,
}

impl StorageApi {
    /// Open the service's store and database and, if an analysis URL is
    /// configured, start the trigger notifier.
    pub async fn new(settings: StorageSettings) -> Result<Self> {
        let notifier: Option<Arc<dyn TaskHandler<AnalysisRequest>>> = match &settings.analysis_url {
            Some(url) => Some(Arc::new(HttpAnalysisNotifier::new(url, settings.notify_timeout)?)),
            None => {
                warn!("No analysis service configured; uploads will not trigger analysis");
                None
            }
        };
        Self::with_notifier(settings, notifier).await
    }

    /// Like [`Self::new`], with a caller-supplied notification handler.
    pub async fn with_notifier(
        settings: StorageSettings,
        notifier: Option<Arc<dyn TaskHandler<AnalysisRequest>>>,
    ) -> Result<Self> {
        let store = ContentStore::open(settings.blobs_dir())?;
        let registry = FileRegistry::open_at(&settings.database_path())?;
        let notifications = notifier.map(|handler| TaskQueue::spawn("notification", handler));

        info!(
            "Storage service ready at {} ({} files)",
            settings.data_dir.display(),
            registry.count()?
        );

        Ok(Self {
            settings,
            store,
            registry,
            notifications,
        })
    }

    /// Store `content` unless identical content is already registered.
    ///
    /// A new file is registered and announced to the analysis service; a
    /// duplicate returns the existing record without touching the store.
    pub async fn upload(
        &self,
        original_filename: &str,
        mime_type: Option<String>,
        content: Bytes,
    ) -> Result<UploadOutcome> {
        if original_filename.trim().is_empty() {
            return Err(TextcloudError::invalid("filename", "An uploaded file needs a filename."));
        }

        let hash = sha256_hex(&content);
        if let Some(existing) = self.registry.find_by_hash(&hash)? {
            info!(
                "Upload of {} matches existing file {} (hash {})",
                original_filename, existing.id, hash
            );
            return Ok(UploadOutcome {
                metadata: existing,
                created: false,
            });
        }

        let blob = self.store.put_with_digest(hash, content).await?;
        let new_file = NewFile {
            original_filename: original_filename.to_string(),
            file_hash: blob.hash,
            mime_type,
            size_bytes: blob.size_bytes,
            file_location: blob.location,
        };

        let metadata = match self.registry.create(new_file) {
            Ok(metadata) => metadata,
            Err(TextcloudError::DuplicateHash { hash }) => {
                // A concurrent upload of the same content registered first.
                let existing = self.registry.find_by_hash(&hash)?.ok_or_else(|| {
                    TextcloudError::Other(format!("File with hash {} vanished after conflict", hash))
                })?;
                debug!("Lost registration race for hash {}, using file {}", hash, existing.id);
                return Ok(UploadOutcome {
                    metadata: existing,
                    created: false,
                });
            }
            Err(e) => return Err(e),
        };

        info!(
            "Stored file {} ({}, {} bytes)",
            metadata.id, metadata.original_filename, metadata.size_bytes
        );
        self.announce(&metadata);

        Ok(UploadOutcome {
            metadata,
            created: true,
        })
    }

    fn announce(&self, metadata: &FileMetadata) {
        let Some(queue) = &self.notifications else {
            return;
        };

        let request = AnalysisRequest {
            file_id: metadata.id,
            file_location: self.download_url(metadata.id),
            original_filename: metadata.original_filename.clone(),
            mime_type: metadata
                .mime_type
                .clone()
                .unwrap_or_else(|| StorageConfig::DEFAULT_MIME_TYPE.to_string()),
        };
        if let Err(e) = queue.submit(request) {
            warn!("Could not queue analysis trigger for {}: {}", metadata.id, e);
        }
    }

    /// Fetchable download reference of a stored file.
    pub fn download_url(&self, file_id: Uuid) -> Url {
        let mut url = self.settings.public_url.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}/download", base, file_id));
        url.set_query(None);
        url
    }

    pub fn metadata(&self, file_id: Uuid) -> Result<FileMetadata> {
        self.registry
            .find_by_id(file_id)?
            .ok_or(TextcloudError::FileNotFound { file_id })
    }

    /// Metadata and content of a stored file.
    pub async fn download(&self, file_id: Uuid) -> Result<(FileMetadata, Bytes)> {
        let metadata = self.metadata(file_id)?;
        match self.store.get(&metadata.file_location).await {
            Ok(content) => Ok((metadata, content)),
            Err(e @ TextcloudError::BlobNotFound { .. }) => {
                error!(
                    "File {} is registered but its blob {} is missing",
                    file_id, metadata.file_location
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

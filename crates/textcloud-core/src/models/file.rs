//! Stored file metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of one stored file. One row per distinct content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: Uuid,
    pub original_filename: String,
    pub file_hash: String,
    /// Storage-relative blob location, derived from `file_hash`.
    pub file_location: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Fields supplied when registering a new file.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub original_filename: String,
    pub file_hash: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    pub file_location: String,
}

/// Body posted to the analysis service when a new file is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub file_id: Uuid,
    /// Fetchable download reference of the file's content.
    pub file_location: url::Url,
    pub original_filename: String,
    pub mime_type: String,
}

//! Error types for Textcloud.
//!
//! Every variant is classified into an [`ErrorKind`], which decides how the
//! error is surfaced over HTTP and whether a background job records it.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the Textcloud core library.
#[derive(Debug, Error)]
pub enum TextcloudError {
    // Collaborator errors
    #[error("Request to {target} failed: {message}")]
    Network { target: String, message: String },

    #[error("Request to {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("{target} responded with {status}: {body}")]
    UpstreamStatus {
        target: String,
        status: u16,
        body: String,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Lookup errors
    #[error("File not found: {file_id}")]
    FileNotFound { file_id: Uuid },

    #[error("Analysis result not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: Uuid },

    #[error("Analysis result not found or image not available.")]
    ArtifactUnavailable { analysis_id: Uuid },

    #[error("Word cloud image file not found on server.")]
    ArtifactMissing { filename: String },

    /// A metadata row points at a blob that is gone from the content store.
    #[error("File found in DB but not in storage. Inconsistency. (location: {location})")]
    BlobNotFound { location: String },

    // Conflicts
    #[error("File with hash {hash} is already registered")]
    DuplicateHash { hash: String },

    #[error("Analysis for file {file_id} is already in progress with status: {status}")]
    AnalysisInProgress { file_id: Uuid, status: String },

    #[error("Invalid analysis status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Validation errors
    #[error("{message}")]
    InvalidInput { field: String, message: String },

    #[error("File type '{mime_type}' not supported for word cloud analysis.")]
    UnsupportedMediaType { mime_type: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Textcloud operations.
pub type Result<T> = std::result::Result<T, TextcloudError>;

/// Coarse classification used to pick a status code and a wire error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    UpstreamUnavailable,
    UpstreamRejected,
    Inconsistency,
    Unexpected,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::UpstreamUnavailable => 503,
            ErrorKind::UpstreamRejected => 502,
            ErrorKind::Inconsistency | ErrorKind::Unexpected => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::UpstreamRejected => "upstream_rejected",
            ErrorKind::Inconsistency => "inconsistency",
            ErrorKind::Unexpected => "unexpected_failure",
        }
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for TextcloudError {
    fn from(err: std::io::Error) -> Self {
        TextcloudError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TextcloudError {
    fn from(err: serde_json::Error) -> Self {
        TextcloudError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for TextcloudError {
    fn from(err: rusqlite::Error) -> Self {
        TextcloudError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for TextcloudError {
    fn from(err: url::ParseError) -> Self {
        TextcloudError::InvalidInput {
            field: "url".to_string(),
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl TextcloudError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        TextcloudError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named input.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        TextcloudError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TextcloudError::FileNotFound { .. }
            | TextcloudError::AnalysisNotFound { .. }
            | TextcloudError::ArtifactUnavailable { .. }
            | TextcloudError::ArtifactMissing { .. } => ErrorKind::NotFound,

            TextcloudError::DuplicateHash { .. }
            | TextcloudError::AnalysisInProgress { .. }
            | TextcloudError::InvalidTransition { .. } => ErrorKind::Conflict,

            TextcloudError::InvalidInput { .. } | TextcloudError::UnsupportedMediaType { .. } => {
                ErrorKind::InvalidInput
            }

            TextcloudError::Network { .. } | TextcloudError::Timeout { .. } => {
                ErrorKind::UpstreamUnavailable
            }

            TextcloudError::UpstreamStatus { .. } => ErrorKind::UpstreamRejected,

            TextcloudError::BlobNotFound { .. } => ErrorKind::Inconsistency,

            // All other errors are unexpected failures
            _ => ErrorKind::Unexpected,
        }
    }

    /// HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }
}

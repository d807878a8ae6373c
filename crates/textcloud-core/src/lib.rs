//! Textcloud Core - content-addressed file storage and asynchronous text analysis.
//!
//! This crate holds everything behind the HTTP surfaces of the storage and
//! analysis services. It can be used programmatically without any HTTP layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use textcloud_core::{StorageApi, StorageSettings};
//!
//! #[tokio::main]
//! async fn main() -> textcloud_core::Result<()> {
//!     let settings = StorageSettings::new("/tmp/textcloud", "http://localhost:8001".parse()?);
//!     let api = StorageApi::new(settings).await?;
//!
//!     let outcome = api.upload("notes.txt", Some("text/plain".into()), "hello".into()).await?;
//!     println!("Stored {} (new: {})", outcome.metadata.id, outcome.created);
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod registry;
pub mod storage;
pub mod tasks;

mod api;

// Re-export commonly used types
pub use analysis::{AnalysisJob, AnalysisRunner, ArtifactRenderer, ContentFetcher, TriggerDecision};
pub use api::{AnalysisApi, StorageApi, TriggerOutcome, UploadOutcome};
pub use config::{AnalysisSettings, StorageSettings};
pub use error::{ErrorKind, Result, TextcloudError};
pub use models::{
    AnalysisRequest, AnalysisResult, AnalysisResultView, AnalysisStatus, FileMetadata,
    TextStatistics,
};
pub use registry::{AnalysisRegistry, FileRegistry};
pub use storage::{ArtifactStore, ContentStore};
pub use tasks::{TaskHandler, TaskQueue};

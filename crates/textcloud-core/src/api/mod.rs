//! Service facades used by the HTTP layer.

mod analysis;
mod storage;

pub use analysis::{AnalysisApi, TriggerOutcome};
pub use storage::{StorageApi, UploadOutcome};

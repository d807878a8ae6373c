//! Word-cloud analysis: statistics, trigger policy and the job runner.

mod runner;
mod stats;
pub mod trigger;

pub use runner::{is_textual, AnalysisJob, AnalysisRunner, ArtifactRenderer, ContentFetcher};
pub use stats::text_statistics;
pub use trigger::TriggerDecision;

//! SQLite-backed registries.
//!
//! Each service owns one database:
//! - **files.db**: [`FileRegistry`], metadata of stored files keyed by id and hash
//! - **analysis.db**: [`AnalysisRegistry`], analysis records and their lifecycle

mod analysis_registry;
mod connection;
mod file_registry;

pub use analysis_registry::AnalysisRegistry;
pub use file_registry::FileRegistry;

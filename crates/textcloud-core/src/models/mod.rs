//! Data models shared by the storage and analysis services.
//!
//! Field names follow the JSON wire format of the HTTP API.

mod analysis;
mod file;

pub use analysis::*;
pub use file::*;

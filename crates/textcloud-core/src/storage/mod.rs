//! On-disk storage: the content-addressed blob store, the artifact
//! directory, and the atomic write and hashing helpers they share.

pub mod atomic;
mod artifact_store;
mod content_store;
pub mod hashing;

pub use artifact_store::ArtifactStore;
pub use content_store::{ContentStore, StoredBlob};
pub use hashing::sha256_hex;

//! HTTP collaborators of the storage and analysis services.

mod client;

pub use client::{HttpAnalysisNotifier, HttpClient, HttpContentFetcher, WordCloudRenderer};

//! Centralized configuration for Textcloud.
//!
//! Compile-time defaults for storage layout, analysis, the word-cloud
//! collaborator and network timeouts. Runtime values are passed in through
//! [`StorageSettings`] and [`AnalysisSettings`].

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Textcloud";
    pub const DATA_DIR_NAME: &'static str = "textcloud";
    pub const USER_AGENT: &'static str = "Textcloud/0.1";
}

/// Layout and limits of the file storage service.
pub struct StorageConfig;

impl StorageConfig {
    pub const BLOBS_DIR_NAME: &'static str = "blobs";
    pub const DATABASE_FILE_NAME: &'static str = "files.db";
    /// Number of leading hash characters used as the shard directory.
    pub const SHARD_PREFIX_LEN: usize = 2;
    pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
    pub const DEFAULT_MIME_TYPE: &'static str = "application/octet-stream";
    pub const DEFAULT_PORT: u16 = 8001;
}

/// Analysis service layout.
pub struct AnalysisConfig;

impl AnalysisConfig {
    pub const ARTIFACTS_DIR_NAME: &'static str = "wordclouds";
    pub const DATABASE_FILE_NAME: &'static str = "analysis.db";
    /// Path prefix under which artifacts are served.
    pub const ARTIFACT_ROUTE_PREFIX: &'static str = "/analysis/wordclouds";
    pub const ARTIFACT_SUFFIX: &'static str = "_wordcloud.png";
    pub const ARTIFACT_MEDIA_TYPE: &'static str = "image/png";
    pub const DEFAULT_PORT: u16 = 8002;
}

/// Fixed rendering parameters sent to the word-cloud collaborator.
pub struct WordCloudConfig;

impl WordCloudConfig {
    pub const DEFAULT_API_URL: &'static str = "https://quickchart.io/wordcloud";
    pub const FORMAT: &'static str = "png";
    pub const WIDTH: u32 = 500;
    pub const HEIGHT: u32 = 500;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
    pub const RENDER_TIMEOUT: Duration = Duration::from_secs(30);
    pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
    pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(60);
    /// Maximum number of response-body bytes quoted in error messages.
    pub const ERROR_BODY_PREVIEW: usize = 512;
}

/// SQLite configuration.
pub struct DatabaseConfig;

impl DatabaseConfig {
    pub const BUSY_TIMEOUT_MS: u64 = 5_000;
}

/// Runtime settings for the storage service.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Directory holding `blobs/` and `files.db`.
    pub data_dir: PathBuf,
    /// Externally reachable base URL of this service, used to build download references.
    pub public_url: Url,
    /// Analysis service base URL; `None` disables trigger notifications.
    pub analysis_url: Option<Url>,
    pub notify_timeout: Duration,
}

impl StorageSettings {
    pub fn new(data_dir: impl Into<PathBuf>, public_url: Url) -> Self {
        Self {
            data_dir: data_dir.into(),
            public_url,
            analysis_url: None,
            notify_timeout: NetworkConfig::NOTIFY_TIMEOUT,
        }
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.data_dir.join(StorageConfig::BLOBS_DIR_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(StorageConfig::DATABASE_FILE_NAME)
    }
}

/// Runtime settings for the analysis service.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Directory holding `wordclouds/` and `analysis.db`.
    pub data_dir: PathBuf,
    /// Externally reachable base URL of this service, used for artifact URLs.
    pub public_url: Url,
    pub wordcloud_url: Url,
    pub fetch_timeout: Duration,
    pub render_timeout: Duration,
}

impl AnalysisSettings {
    pub fn new(data_dir: impl Into<PathBuf>, public_url: Url, wordcloud_url: Url) -> Self {
        Self {
            data_dir: data_dir.into(),
            public_url,
            wordcloud_url,
            fetch_timeout: NetworkConfig::FETCH_TIMEOUT,
            render_timeout: NetworkConfig::RENDER_TIMEOUT,
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join(AnalysisConfig::ARTIFACTS_DIR_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(AnalysisConfig::DATABASE_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_paths() {
        let url = Url::parse("http://localhost:8001").unwrap();
        let settings = StorageSettings::new("/var/lib/textcloud", url);
        assert!(settings.blobs_dir().ends_with("blobs"));
        assert!(settings.database_path().ends_with("files.db"));
        assert!(settings.analysis_url.is_none());
    }
}

//! HTTP collaborators.
//!
//! - [`HttpContentFetcher`]: downloads stored file content for a run
//! - [`WordCloudRenderer`]: posts text to the word-cloud API and returns the image
//! - [`HttpAnalysisNotifier`]: tells the analysis service about a new upload

use crate::analysis::{ArtifactRenderer, ContentFetcher};
use crate::config::{AppConfig, NetworkConfig, WordCloudConfig};
use crate::models::AnalysisRequest;
use crate::tasks::TaskHandler;
use crate::{Result, TextcloudError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Thin wrapper around a `reqwest` client with a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| TextcloudError::Network {
                target: "http client".to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Map a transport error, naming `target` and the configured timeout.
    pub fn request_error(&self, target: &str, err: reqwest::Error) -> TextcloudError {
        if err.is_timeout() {
            TextcloudError::Timeout {
                target: target.to_string(),
                after: self.timeout,
            }
        } else {
            TextcloudError::Network {
                target: target.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Turn a non-success response into [`TextcloudError::UpstreamStatus`].
async fn ensure_success(target: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TextcloudError::UpstreamStatus {
        target: target.to_string(),
        status: status.as_u16(),
        body: preview(&body),
    })
}

/// Truncate a response body for inclusion in an error message.
fn preview(body: &str) -> String {
    let limit = NetworkConfig::ERROR_BODY_PREVIEW;
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Fetches file content over HTTP.
pub struct HttpContentFetcher {
    http: HttpClient,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_timeout(timeout)?,
        })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch_text(&self, location: &Url) -> Result<String> {
        let target = location.as_str();
        debug!("Fetching {}", target);

        let response = self
            .http
            .inner()
            .get(location.clone())
            .send()
            .await
            .map_err(|e| self.http.request_error(target, e))?;
        let response = ensure_success(target, response).await?;

        response
            .text()
            .await
            .map_err(|e| self.http.request_error(target, e))
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    text: &'a str,
    format: &'static str,
    width: u32,
    height: u32,
}

/// Word-cloud rendering collaborator.
pub struct WordCloudRenderer {
    http: HttpClient,
    endpoint: Url,
}

impl WordCloudRenderer {
    const TARGET: &'static str = "Word Cloud API";

    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_timeout(timeout)?,
            endpoint,
        })
    }
}

#[async_trait]
impl ArtifactRenderer for WordCloudRenderer {
    async fn render(&self, text: &str) -> Result<Bytes> {
        let request = RenderRequest {
            text,
            format: WordCloudConfig::FORMAT,
            width: WordCloudConfig::WIDTH,
            height: WordCloudConfig::HEIGHT,
        };
        debug!("Requesting word cloud from {} ({} chars)", self.endpoint, text.len());

        let response = self
            .http
            .inner()
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.http.request_error(Self::TARGET, e))?;
        let response = ensure_success(Self::TARGET, response).await?;

        response
            .bytes()
            .await
            .map_err(|e| self.http.request_error(Self::TARGET, e))
    }
}

/// Posts [`AnalysisRequest`]s to the analysis service's trigger endpoint.
///
/// Used as a fire-and-forget [`TaskHandler`]: failures are logged, never
/// retried, and never reach the upload that caused them.
pub struct HttpAnalysisNotifier {
    http: HttpClient,
    trigger_url: Url,
}

impl HttpAnalysisNotifier {
    pub fn new(analysis_url: &Url, timeout: Duration) -> Result<Self> {
        let mut trigger_url = analysis_url.clone();
        let base = analysis_url.path().trim_end_matches('/').to_string();
        trigger_url.set_path(&format!("{}/analysis/", base));

        Ok(Self {
            http: HttpClient::with_timeout(timeout)?,
            trigger_url,
        })
    }

    pub fn trigger_url(&self) -> &Url {
        &self.trigger_url
    }

    pub async fn notify(&self, request: &AnalysisRequest) -> Result<()> {
        let target = self.trigger_url.as_str();
        let response = self
            .http
            .inner()
            .post(self.trigger_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| self.http.request_error(target, e))?;
        let response = ensure_success(target, response).await?;

        info!(
            "Triggered analysis for file {} ({})",
            request.file_id,
            response.status()
        );
        Ok(())
    }
}

#[async_trait]
impl TaskHandler<AnalysisRequest> for HttpAnalysisNotifier {
    async fn handle(&self, request: AnalysisRequest) {
        if let Err(e) = self.notify(&request).await {
            warn!(
                "Could not trigger analysis for file {}: {}",
                request.file_id, e
            );
        }
    }
}

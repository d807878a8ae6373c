//! Analysis records, their lifecycle, and the public view.

use crate::config::AnalysisConfig;
use crate::error::{Result, TextcloudError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Lifecycle status of an analysis record.
///
/// Transitions only move forward: `Pending -> Processing -> {Completed, Failed}`.
/// `Pending -> Failed` is also allowed so a run that breaks before it could
/// mark itself processing still resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "PENDING",
            AnalysisStatus::Processing => "PROCESSING",
            AnalysisStatus::Completed => "COMPLETED",
            AnalysisStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(AnalysisStatus::Pending),
            "PROCESSING" => Some(AnalysisStatus::Processing),
            "COMPLETED" => Some(AnalysisStatus::Completed),
            "FAILED" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }

    /// Pending or processing: a job owns this record.
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        match (self, next) {
            (Pending, Pending) | (Processing, Processing) => true,
            (Pending, Processing) | (Pending, Failed) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text statistics computed by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStatistics {
    pub paragraphs: usize,
    pub words: usize,
    pub characters: usize,
}

/// One analysis attempt for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub original_file_id: Uuid,
    pub status: AnalysisStatus,
    /// Artifact file name relative to the artifact directory.
    pub artifact_location: Option<String>,
    pub analysis_data: Option<TextStatistics>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new_pending(original_file_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_file_id,
            status: AnalysisStatus::Pending,
            artifact_location: None,
            analysis_data: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an analysis record. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisUpdate {
    pub status: Option<AnalysisStatus>,
    pub artifact_location: Option<String>,
    pub analysis_data: Option<TextStatistics>,
    pub error_message: Option<String>,
}

impl AnalysisUpdate {
    pub fn processing() -> Self {
        Self {
            status: Some(AnalysisStatus::Processing),
            ..Default::default()
        }
    }

    pub fn completed(artifact_location: String, analysis_data: TextStatistics) -> Self {
        Self {
            status: Some(AnalysisStatus::Completed),
            artifact_location: Some(artifact_location),
            analysis_data: Some(analysis_data),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>, analysis_data: Option<TextStatistics>) -> Self {
        Self {
            status: Some(AnalysisStatus::Failed),
            artifact_location: None,
            analysis_data,
            error_message: Some(error_message.into()),
        }
    }
}

/// Apply `update` to `previous`, producing the row to persist.
///
/// Only supplied fields are written. Afterwards a non-FAILED row loses its
/// error message unless one was supplied, and a FAILED row loses its artifact
/// and data unless they were supplied. Terminal rows accept no writes.
pub fn apply_update(
    previous: &AnalysisResult,
    update: &AnalysisUpdate,
    now: DateTime<Utc>,
) -> Result<AnalysisResult> {
    let next_status = update.status.unwrap_or(previous.status);
    if !previous.status.can_transition_to(next_status) {
        return Err(TextcloudError::InvalidTransition {
            from: previous.status.to_string(),
            to: next_status.to_string(),
        });
    }

    let mut next = previous.clone();
    next.status = next_status;
    if let Some(location) = &update.artifact_location {
        next.artifact_location = Some(location.clone());
    }
    if let Some(data) = update.analysis_data {
        next.analysis_data = Some(data);
    }
    if let Some(message) = &update.error_message {
        next.error_message = Some(message.clone());
    }

    if next.status != AnalysisStatus::Failed && update.error_message.is_none() {
        next.error_message = None;
    }
    if next.status == AnalysisStatus::Failed {
        if update.artifact_location.is_none() {
            next.artifact_location = None;
        }
        if update.analysis_data.is_none() {
            next.analysis_data = None;
        }
    }

    next.updated_at = now;
    Ok(next)
}

/// Fetchable URL of an artifact: `{base}/analysis/wordclouds/{id}/{filename}`.
///
/// Any path or query on `base` is replaced.
pub fn artifact_url(base: &Url, analysis_id: Uuid, artifact_filename: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!(
        "{}/{}/{}",
        AnalysisConfig::ARTIFACT_ROUTE_PREFIX,
        analysis_id,
        artifact_filename
    ));
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Public representation of an analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResultView {
    pub id: Uuid,
    pub original_file_id: Uuid,
    pub analysis_status: AnalysisStatus,
    pub error_message: Option<String>,
    pub word_cloud_image_url: Option<Url>,
    pub analysis_data: Option<TextStatistics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResultView {
    /// Build the view; the artifact URL is only resolved for completed rows
    /// that carry an artifact.
    pub fn from_result(result: &AnalysisResult, base_url: &Url) -> Self {
        let word_cloud_image_url = match (&result.status, &result.artifact_location) {
            (AnalysisStatus::Completed, Some(location)) => {
                let filename = location.rsplit('/').next().unwrap_or(location);
                Some(artifact_url(base_url, result.id, filename))
            }
            _ => None,
        };

        Self {
            id: result.id,
            original_file_id: result.original_file_id,
            analysis_status: result.status,
            error_message: result.error_message.clone(),
            word_cloud_image_url,
            analysis_data: result.analysis_data,
            created_at: result.created_at,
            updated_at: result.updated_at,
        }
    }
}

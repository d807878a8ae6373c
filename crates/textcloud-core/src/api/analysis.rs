//! Analysis service facade.

use crate::analysis::{
    AnalysisJob, AnalysisRunner, ArtifactRenderer, ContentFetcher, TriggerDecision,
};
use crate::config::AnalysisSettings;
use crate::models::{
    AnalysisRequest, AnalysisResult, AnalysisResultView, AnalysisStatus, AnalysisUpdate,
};
use crate::network::{HttpContentFetcher, WordCloudRenderer};
use crate::registry::AnalysisRegistry;
use crate::storage::ArtifactStore;
use crate::tasks::TaskQueue;
use crate::{Result, TextcloudError};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a trigger request.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub view: AnalysisResultView,
    /// `true` when a new PENDING record was created and a run scheduled.
    pub created: bool,
}

/// Trigger, status and artifact operations of the analysis service.
pub struct AnalysisApi {
    settings: AnalysisSettings,
    registry: AnalysisRegistry,
    artifacts: ArtifactStore,
    jobs: TaskQueue<AnalysisJob>,
}

impl AnalysisApi {
    /// Open the service with the HTTP fetcher and the configured word-cloud API.
    pub async fn new(settings: AnalysisSettings) -> Result<Self> {
        let fetcher = Arc::new(HttpContentFetcher::new(settings.fetch_timeout)?);
        let renderer = Arc::new(WordCloudRenderer::new(
            settings.wordcloud_url.clone(),
            settings.render_timeout,
        )?);
        Self::with_collaborators(settings, fetcher, renderer).await
    }

    /// Open the service with caller-supplied collaborators.
    pub async fn with_collaborators(
        settings: AnalysisSettings,
        fetcher: Arc<dyn ContentFetcher>,
        renderer: Arc<dyn ArtifactRenderer>,
    ) -> Result<Self> {
        let registry = AnalysisRegistry::open_at(&settings.database_path())?;
        let artifacts = ArtifactStore::new(settings.artifacts_dir());

        let runner = AnalysisRunner::new(registry.clone(), artifacts.clone(), fetcher, renderer)
            .with_timeouts(settings.fetch_timeout, settings.render_timeout);
        let jobs: TaskQueue<AnalysisJob> = TaskQueue::spawn("analysis", Arc::new(runner));

        info!(
            "Analysis service ready at {} (word cloud API {})",
            settings.data_dir.display(),
            settings.wordcloud_url
        );

        Ok(Self {
            settings,
            registry,
            artifacts,
            jobs,
        })
    }

    /// Start an analysis of `request.file_id`, or reuse a completed one.
    ///
    /// Returns as soon as the PENDING record exists; the run itself happens
    /// in the background.
    pub fn trigger(&self, request: AnalysisRequest) -> Result<TriggerOutcome> {
        let decision = self.registry.begin_analysis(request.file_id).map_err(|e| {
            warn!("Rejected analysis trigger for file {}: {}", request.file_id, e);
            e
        })?;

        let record = match decision {
            TriggerDecision::Reused(done) => {
                info!(
                    "Analysis {} already completed for file {}",
                    done.id, request.file_id
                );
                return Ok(TriggerOutcome {
                    view: self.view(&done),
                    created: false,
                });
            }
            TriggerDecision::Created(record) => record,
        };

        let job = AnalysisJob {
            analysis_id: record.id,
            file_id: request.file_id,
            file_location: request.file_location,
            original_filename: request.original_filename,
            mime_type: request.mime_type,
        };
        if let Err(e) = self.jobs.submit(job) {
            self.registry
                .update(record.id, &AnalysisUpdate::failed(e.to_string(), None))?;
            return Err(e);
        }

        info!("Scheduled analysis {} for file {}", record.id, request.file_id);
        Ok(TriggerOutcome {
            view: self.view(&record),
            created: true,
        })
    }

    pub fn get(&self, analysis_id: Uuid) -> Result<AnalysisResultView> {
        self.registry
            .find_by_id(analysis_id)?
            .map(|result| self.view(&result))
            .ok_or(TextcloudError::AnalysisNotFound { analysis_id })
    }

    /// Every analysis attempt for a file, oldest first. Unknown files yield an empty list.
    pub fn list_for_file(&self, original_file_id: Uuid) -> Result<Vec<AnalysisResultView>> {
        Ok(self
            .registry
            .find_by_original_file_id(original_file_id)?
            .iter()
            .map(|result| self.view(result))
            .collect())
    }

    /// Read an artifact addressed as `{analysis_id}/{filename}`.
    ///
    /// Checks, in order, each failing closed: the id is a UUID; the filename
    /// starts with the id in canonical lowercase form; it holds no separators
    /// or traversal; the analysis is completed with an artifact; the filename
    /// is the recorded one; the file exists.
    pub async fn artifact(&self, analysis_id: &str, filename: &str) -> Result<Bytes> {
        let id = Uuid::parse_str(analysis_id)
            .map_err(|_| TextcloudError::invalid("analysis_id", "Invalid analysis ID."))?;

        if !filename.starts_with(&id.to_string()) {
            warn!("Artifact request {}/{} does not match its analysis", analysis_id, filename);
            return Err(TextcloudError::invalid(
                "filename",
                "Requested filename does not match analysis ID.",
            ));
        }
        ArtifactStore::validate_name(filename)?;

        let stored = match self.registry.find_by_id(id)? {
            Some(result) if result.status == AnalysisStatus::Completed => result.artifact_location,
            _ => None,
        }
        .ok_or(TextcloudError::ArtifactUnavailable { analysis_id: id })?;

        if stored != filename {
            return Err(TextcloudError::invalid(
                "filename",
                "Requested filename does not match stored filename.",
            ));
        }

        self.artifacts.read(filename).await
    }

    fn view(&self, result: &AnalysisResult) -> AnalysisResultView {
        AnalysisResultView::from_result(result, &self.settings.public_url)
    }
}

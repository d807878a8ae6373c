//! Analysis job runner.
//!
//! Drives one analysis record from PENDING to a terminal status:
//! mark PROCESSING, check the media type, fetch the content, compute
//! statistics, render the word cloud, store the artifact, mark COMPLETED.
//! Every failure along the way ends in a FAILED record carrying the error
//! message and whatever statistics were already computed.

use crate::analysis::stats::text_statistics;
use crate::config::NetworkConfig;
use crate::error::{Result, TextcloudError};
use crate::models::{AnalysisResult, AnalysisUpdate, TextStatistics};
use crate::registry::AnalysisRegistry;
use crate::storage::ArtifactStore;
use crate::tasks::TaskHandler;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Fetches the content of a stored file from its download reference.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_text(&self, location: &Url) -> Result<String>;
}

/// Renders text into an image.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, text: &str) -> Result<Bytes>;
}

/// One scheduled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisJob {
    pub analysis_id: Uuid,
    pub file_id: Uuid,
    pub file_location: Url,
    pub original_filename: String,
    pub mime_type: String,
}

/// Whether a media type names textual content.
pub fn is_textual(mime_type: &str) -> bool {
    mime_type.to_ascii_lowercase().contains("text")
}

/// Executes [`AnalysisJob`]s against the registry and the collaborators.
pub struct AnalysisRunner {
    registry: AnalysisRegistry,
    artifacts: ArtifactStore,
    fetcher: Arc<dyn ContentFetcher>,
    renderer: Arc<dyn ArtifactRenderer>,
    fetch_timeout: Duration,
    render_timeout: Duration,
    /// Statistics of runs still in flight, kept so a panicked run can record them.
    computed: Mutex<HashMap<Uuid, TextStatistics>>,
}

impl AnalysisRunner {
    pub fn new(
        registry: AnalysisRegistry,
        artifacts: ArtifactStore,
        fetcher: Arc<dyn ContentFetcher>,
        renderer: Arc<dyn ArtifactRenderer>,
    ) -> Self {
        Self {
            registry,
            artifacts,
            fetcher,
            renderer,
            fetch_timeout: NetworkConfig::FETCH_TIMEOUT,
            render_timeout: NetworkConfig::RENDER_TIMEOUT,
            computed: Mutex::new(HashMap::new()),
        }
    }

    /// Bound the time spent waiting on each collaborator.
    pub fn with_timeouts(mut self, fetch_timeout: Duration, render_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self.render_timeout = render_timeout;
        self
    }

    /// Run `job` to completion.
    ///
    /// Returns the terminal record, or `None` if the record vanished or could
    /// not be finalized.
    pub async fn run(&self, job: &AnalysisJob) -> Option<AnalysisResult> {
        info!(
            "Analysis {}: starting for file {} ({})",
            job.analysis_id, job.file_id, job.original_filename
        );

        let outcome = self.execute(job).await;
        let computed = self.take_statistics(job.analysis_id);
        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Analysis {}: failed: {}", job.analysis_id, e);
                self.mark_failed(job.analysis_id, e.to_string(), computed)
            }
        }
    }

    async fn execute(&self, job: &AnalysisJob) -> Result<Option<AnalysisResult>> {
        if self
            .registry
            .update(job.analysis_id, &AnalysisUpdate::processing())?
            .is_none()
        {
            warn!("Analysis {}: record not found, skipping run", job.analysis_id);
            return Ok(None);
        }

        if !is_textual(&job.mime_type) {
            return Err(TextcloudError::UnsupportedMediaType {
                mime_type: job.mime_type.clone(),
            });
        }

        let text = bounded(
            job.file_location.as_str(),
            self.fetch_timeout,
            self.fetcher.fetch_text(&job.file_location),
        )
        .await?;
        debug!(
            "Analysis {}: fetched {} bytes from {}",
            job.analysis_id,
            text.len(),
            job.file_location
        );

        let stats = text_statistics(&text);
        self.remember_statistics(job.analysis_id, stats);
        debug!("Analysis {}: {:?}", job.analysis_id, stats);

        let image = bounded("Word Cloud API", self.render_timeout, self.renderer.render(&text)).await?;

        let name = ArtifactStore::artifact_name(job.analysis_id, &job.original_filename);
        self.artifacts.save(&name, image).await?;

        let done = self
            .registry
            .update(job.analysis_id, &AnalysisUpdate::completed(name.clone(), stats))?;
        if done.is_some() {
            info!("Analysis {}: completed, artifact {}", job.analysis_id, name);
        }
        Ok(done)
    }

    fn remember_statistics(&self, analysis_id: Uuid, stats: TextStatistics) {
        self.computed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(analysis_id, stats);
    }

    fn take_statistics(&self, analysis_id: Uuid) -> Option<TextStatistics> {
        self.computed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&analysis_id)
    }

    /// Record a FAILED status, keeping `analysis_data` if it was computed.
    pub fn mark_failed(
        &self,
        analysis_id: Uuid,
        message: String,
        analysis_data: Option<TextStatistics>,
    ) -> Option<AnalysisResult> {
        match self
            .registry
            .update(analysis_id, &AnalysisUpdate::failed(message, analysis_data))
        {
            Ok(result) => result,
            Err(e) => {
                error!("Analysis {}: could not record failure: {}", analysis_id, e);
                None
            }
        }
    }
}

async fn bounded<T>(
    target: &str,
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| TextcloudError::Timeout {
            target: target.to_string(),
            after: limit,
        })?
}

#[async_trait]
impl TaskHandler<AnalysisJob> for AnalysisRunner {
    async fn handle(&self, job: AnalysisJob) {
        self.run(&job).await;
    }

    async fn recover(&self, job: AnalysisJob, panic_message: String) {
        error!("Analysis {}: run panicked: {}", job.analysis_id, panic_message);
        self.mark_failed(
            job.analysis_id,
            format!("Unexpected failure during analysis: {}", panic_message),
            self.take_statistics(job.analysis_id),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisStatus;
    use crate::tasks::TaskQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StaticFetcher(Result<String>);

    #[async_trait]
    impl ContentFetcher for StaticFetcher {
        async fn fetch_text(&self, location: &Url) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(TextcloudError::UpstreamStatus {
                    target: location.to_string(),
                    status: 404,
                    body: "gone".into(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct CountingRenderer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ArtifactRenderer for CountingRenderer {
        async fn render(&self, _text: &str) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TextcloudError::UpstreamStatus {
                    target: "Word Cloud API".into(),
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(Bytes::from_static(b"\x89PNG"))
        }
    }

    struct PanickingRenderer;

    #[async_trait]
    impl ArtifactRenderer for PanickingRenderer {
        async fn render(&self, _text: &str) -> Result<Bytes> {
            panic!("renderer exploded");
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl ContentFetcher for SlowFetcher {
        async fn fetch_text(&self, _location: &Url) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct Fixture {
        _dir: TempDir,
        registry: AnalysisRegistry,
        artifacts: ArtifactStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let artifacts = ArtifactStore::new(dir.path().join("wordclouds"));
            Self {
                _dir: dir,
                registry: AnalysisRegistry::in_memory().unwrap(),
                artifacts,
            }
        }

        fn runner(
            &self,
            fetcher: Arc<dyn ContentFetcher>,
            renderer: Arc<dyn ArtifactRenderer>,
        ) -> AnalysisRunner {
            AnalysisRunner::new(self.registry.clone(), self.artifacts.clone(), fetcher, renderer)
        }

        fn job(&self, mime_type: &str) -> AnalysisJob {
            let file_id = Uuid::new_v4();
            let record = self.registry.create(file_id).unwrap();
            AnalysisJob {
                analysis_id: record.id,
                file_id,
                file_location: Url::parse("http://storage.local/x/download").unwrap(),
                original_filename: "notes.txt".into(),
                mime_type: mime_type.into(),
            }
        }
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual("text/plain"));
        assert!(is_textual("TEXT/Markdown; charset=utf-8"));
        assert!(!is_textual("image/png"));
        assert!(!is_textual("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let fixture = Fixture::new();
        let renderer = Arc::new(CountingRenderer::default());
        let runner = fixture.runner(
            Arc::new(StaticFetcher(Ok("hello hello\n\nworld".into()))),
            renderer.clone(),
        );
        let job = fixture.job("text/plain");

        let done = runner.run(&job).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert_eq!(
            done.analysis_data,
            Some(TextStatistics {
                paragraphs: 2,
                words: 3,
                characters: 18,
            })
        );

        let name = done.artifact_location.unwrap();
        assert_eq!(name, format!("{}_notes_wordcloud.png", job.analysis_id));
        assert!(fixture.artifacts.exists(&name));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_type_fails_without_fetching() {
        let fixture = Fixture::new();
        let renderer = Arc::new(CountingRenderer::default());
        let runner = fixture.runner(Arc::new(StaticFetcher(Ok("x".into()))), renderer.clone());
        let job = fixture.job("image/png");

        let failed = runner.run(&job).await.unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
        assert!(failed.error_message.unwrap().contains("image/png"));
        assert!(failed.analysis_data.is_none());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_has_no_data() {
        let fixture = Fixture::new();
        let runner = fixture.runner(
            Arc::new(StaticFetcher(Err(TextcloudError::Other("x".into())))),
            Arc::new(CountingRenderer::default()),
        );

        let failed = runner.run(&fixture.job("text/plain")).await.unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
        assert!(failed.error_message.unwrap().contains("404"));
        assert!(failed.analysis_data.is_none());
    }

    #[tokio::test]
    async fn test_render_failure_keeps_statistics() {
        let fixture = Fixture::new();
        let runner = fixture.runner(
            Arc::new(StaticFetcher(Ok("a b c".into()))),
            Arc::new(CountingRenderer {
                calls: AtomicUsize::new(0),
                fail: true,
            }),
        );

        let failed = runner.run(&fixture.job("text/plain")).await.unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
        assert!(failed.error_message.unwrap().contains("500"));
        assert_eq!(failed.analysis_data.map(|d| d.words), Some(3));
        assert!(failed.artifact_location.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_fails_run() {
        let fixture = Fixture::new();
        let runner = fixture
            .runner(Arc::new(SlowFetcher), Arc::new(CountingRenderer::default()))
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

        let failed = runner.run(&fixture.job("text/plain")).await.unwrap();
        assert_eq!(failed.status, AnalysisStatus::Failed);
        assert!(failed.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let fixture = Fixture::new();
        let runner = fixture.runner(
            Arc::new(StaticFetcher(Ok("x".into()))),
            Arc::new(CountingRenderer::default()),
        );
        let mut job = fixture.job("text/plain");
        job.analysis_id = Uuid::new_v4();

        assert!(runner.run(&job).await.is_none());
    }

    #[tokio::test]
    async fn test_recover_marks_failed() {
        let fixture = Fixture::new();
        let runner = fixture.runner(
            Arc::new(StaticFetcher(Ok("x".into()))),
            Arc::new(CountingRenderer::default()),
        );
        let job = fixture.job("text/plain");

        runner.recover(job.clone(), "boom".into()).await;
        let row = fixture.registry.find_by_id(job.analysis_id).unwrap().unwrap();
        assert_eq!(row.status, AnalysisStatus::Failed);
        assert!(row.error_message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_panicked_run_keeps_statistics() {
        let fixture = Fixture::new();
        let runner = Arc::new(fixture.runner(
            Arc::new(StaticFetcher(Ok("one two\n\nthree".into()))),
            Arc::new(PanickingRenderer),
        ));
        let job = fixture.job("text/plain");

        let queue = TaskQueue::<AnalysisJob>::spawn("analysis", runner.clone());
        queue.submit(job.clone()).unwrap();
        queue.shutdown().await;

        let row = fixture.registry.find_by_id(job.analysis_id).unwrap().unwrap();
        assert_eq!(row.status, AnalysisStatus::Failed);
        assert!(row.error_message.unwrap().contains("renderer exploded"));
        assert_eq!(
            row.analysis_data,
            Some(TextStatistics {
                paragraphs: 2,
                words: 3,
                characters: 14,
            })
        );
        assert!(runner.take_statistics(job.analysis_id).is_none());
    }
}

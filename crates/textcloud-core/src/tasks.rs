//! In-process background task queue.
//!
//! Jobs are sent over an unbounded channel to a supervising worker, which
//! spawns each job as its own task and reaps it when it finishes. A job is
//! delivered to the handler at most once. If the handler panics, the worker
//! hands the job and the panic message to [`TaskHandler::recover`].

use crate::error::{Result, TextcloudError};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

/// Processes jobs taken from a [`TaskQueue`].
#[async_trait]
pub trait TaskHandler<J: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, job: J);

    /// Called when [`Self::handle`] panicked for `job`.
    async fn recover(&self, _job: J, panic_message: String) {
        warn!("Task panicked without a recovery hook: {}", panic_message);
    }
}

/// Handle for submitting jobs to a background worker.
pub struct TaskQueue<J> {
    name: &'static str,
    sender: mpsc::UnboundedSender<J>,
    worker: JoinHandle<()>,
}

impl<J: Clone + Send + 'static> TaskQueue<J> {
    /// Start a worker for `handler`. Must be called within a Tokio runtime.
    pub fn spawn(name: &'static str, handler: Arc<dyn TaskHandler<J>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(supervise(name, handler, receiver));
        debug!("Started {} task queue", name);
        Self {
            name,
            sender,
            worker,
        }
    }

    /// Enqueue a job. Returns immediately; the job runs in the background.
    pub fn submit(&self, job: J) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| TextcloudError::Other(format!("The {} task queue is closed", self.name)))
    }

    /// Stop accepting jobs and wait for every submitted job to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            error!("The {} task queue worker failed: {}", self.name, e);
        }
    }
}

async fn supervise<J: Clone + Send + 'static>(
    name: &'static str,
    handler: Arc<dyn TaskHandler<J>>,
    mut receiver: mpsc::UnboundedReceiver<J>,
) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(job) => {
                    running.spawn(run_one(Arc::clone(&handler), job));
                }
                None => break,
            },
            Some(finished) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = finished {
                    error!("The {} task queue lost a job: {}", name, e);
                }
            }
        }
    }

    while let Some(finished) = running.join_next().await {
        if let Err(e) = finished {
            error!("The {} task queue lost a job: {}", name, e);
        }
    }
    debug!("Stopped {} task queue", name);
}

async fn run_one<J: Clone + Send + 'static>(handler: Arc<dyn TaskHandler<J>>, job: J) {
    let task_handler = Arc::clone(&handler);
    let task_job = job.clone();
    let outcome = tokio::spawn(async move { task_handler.handle(task_job).await }).await;

    if let Err(e) = outcome {
        if e.is_panic() {
            let message = panic_message(e.into_panic());
            handler.recover(job, message).await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

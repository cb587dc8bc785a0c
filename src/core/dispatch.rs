use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::error::RelayError;
use super::fill::{FillGenerator, FillProgress, ImageMode};
use super::platforms::{Platform, PlatformRegistry};
use super::provider::{GenerationOutput, ImageRequest, OperationRequest, VideoRequest};
use super::tasks::{Task, TaskQueue};

/// Turns logical requests into tasks and runs them, at most
/// `max_concurrent` at a time. A task stays queued until it gets a permit.
#[derive(Clone)]
pub struct Dispatcher {
    tasks: Arc<TaskQueue>,
    platforms: Arc<PlatformRegistry>,
    fill: Arc<FillGenerator>,
    video_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<TaskQueue>,
        platforms: Arc<PlatformRegistry>,
        fill: Arc<FillGenerator>,
        video_timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            tasks,
            platforms,
            fill,
            video_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn tasks(&self) -> &Arc<TaskQueue> {
        &self.tasks
    }

    /// Queue the request and return immediately; the task runs in the background.
    pub fn submit(&self, request: OperationRequest, board_ref: Option<String>) -> Task {
        let task = self.tasks.create(request.kind(), request.prompt(), board_ref);
        let this = self.clone();
        let id = task.id.clone();
        tokio::spawn(async move {
            let _ = this.execute(&id, request, Retention::Keep).await;
        });
        task
    }

    /// Queue the request and wait for its outcome. The work is detached from
    /// the caller, so a dropped caller does not leave the task stuck running.
    /// The output goes to the caller only; the ledger keeps just the status.
    pub async fn run(&self, request: OperationRequest) -> Result<GenerationOutput, RelayError> {
        let task = self.tasks.create(request.kind(), request.prompt(), None);
        let this = self.clone();
        tokio::spawn(async move { this.execute(&task.id, request, Retention::Discard).await })
            .await
            .map_err(|e| RelayError::upstream(format!("task aborted: {}", e)))?
    }

    async fn execute(
        &self,
        id: &str,
        request: OperationRequest,
        retention: Retention,
    ) -> Result<GenerationOutput, RelayError> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RelayError::Configuration("dispatcher is shut down".to_string()))?;

        if self.tasks.mark_running(id).is_err() {
            info!("Task {} was canceled before it started", id);
            return Err(RelayError::Validation(format!(
                "task {} was canceled before it started",
                id
            )));
        }

        let outcome = self.perform(id, request).await;
        let recorded = match &outcome {
            Ok(output) => {
                let kept = match retention {
                    Retention::Keep => Some(output.clone()),
                    Retention::Discard => None,
                };
                self.tasks.succeed(id, kept)
            }
            Err(e) => {
                warn!("Task {} failed: {}", id, e);
                self.tasks.fail(id, &e.to_string())
            }
        };
        if let Err(e) = recorded {
            warn!("Could not record outcome of task {}: {}", id, e);
        }
        outcome
    }

    async fn perform(&self, id: &str, request: OperationRequest) -> Result<GenerationOutput, RelayError> {
        let platforms = self.platforms.list().await?;
        match request {
            OperationRequest::EditImage(req) => self.fill_images(id, ImageMode::Edit, platforms, req).await,
            OperationRequest::GenerateImage(req) => {
                self.fill_images(id, ImageMode::FromText, platforms, req).await
            }
            OperationRequest::GenerateVideo(req) => self.generate_video(platforms, req).await,
        }
    }

    async fn fill_images(
        &self,
        id: &str,
        mode: ImageMode,
        platforms: Vec<Platform>,
        request: ImageRequest,
    ) -> Result<GenerationOutput, RelayError> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<FillProgress>();
        let tasks = self.tasks.clone();
        let task_id = id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                let _ = tasks.report_progress(&task_id, progress.completed, progress.desired);
            }
        });

        let result = self.fill.generate(mode, platforms, request, Some(tx)).await;
        // The sender is gone once generate returns; drain so progress lands
        // before the terminal event.
        let _ = forwarder.await;
        Ok(GenerationOutput {
            artifacts: result?,
            text: None,
        })
    }

    async fn generate_video(
        &self,
        platforms: Vec<Platform>,
        request: VideoRequest,
    ) -> Result<GenerationOutput, RelayError> {
        let request = Arc::new(request);
        self.fill
            .runner()
            .with_timeout(self.video_timeout)
            .run("generate-video", &platforms, 0, |_, client| {
                let request = request.clone();
                async move {
                    let output = client.generate_video(&request).await?;
                    if output.artifacts.is_empty() {
                        return Err(RelayError::upstream("no video returned"));
                    }
                    Ok(output)
                }
            })
            .await
    }
}

/// Whether a finished task keeps its output in the ledger.
#[derive(Debug, Clone, Copy)]
enum Retention {
    Keep,
    Discard,
}

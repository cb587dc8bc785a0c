use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::error::{AttemptFailure, RelayError};
use super::failover::FailoverRunner;
use super::platforms::Platform;
use super::provider::{GeneratedArtifact, ImageRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    Edit,
    FromText,
}

impl ImageMode {
    fn operation(self) -> &'static str {
        match self {
            ImageMode::Edit => "edit-image",
            ImageMode::FromText => "generate-image",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FillConfig {
    /// Ceiling on single-image attempts across all rounds.
    pub max_attempts: usize,
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            backoff_step: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillProgress {
    pub completed: usize,
    pub desired: usize,
    pub attempts: usize,
}

/// Reaches a desired number of images by running independent single-image
/// attempts concurrently and topping up shortfalls in further rounds.
pub struct FillGenerator {
    runner: Arc<FailoverRunner>,
    config: FillConfig,
}

impl FillGenerator {
    pub fn new(runner: Arc<FailoverRunner>, config: FillConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &Arc<FailoverRunner> {
        &self.runner
    }

    pub async fn generate(
        &self,
        mode: ImageMode,
        platforms: Vec<Platform>,
        request: ImageRequest,
        progress: Option<UnboundedSender<FillProgress>>,
    ) -> Result<Vec<GeneratedArtifact>, RelayError> {
        let desired = request.count.get();
        let max_attempts = self.config.max_attempts;
        if max_attempts < desired {
            return Err(RelayError::Configuration(format!(
                "fill attempt ceiling {} is below the requested count {}",
                max_attempts, desired
            )));
        }
        if platforms.is_empty() {
            return Err(RelayError::Configuration(
                "no platforms configured".to_string(),
            ));
        }

        let platforms: Arc<[Platform]> = platforms.into();
        let request = Arc::new(request);
        let mut collected: Vec<GeneratedArtifact> = Vec::with_capacity(desired);
        let mut attempts = 0usize;
        let mut rounds = 0u32;
        let mut failures: Vec<AttemptFailure> = Vec::new();

        while collected.len() < desired && attempts < max_attempts {
            let launch = (desired - collected.len()).min(max_attempts - attempts);
            let mut round = JoinSet::new();
            for offset in 0..launch {
                let start = (attempts + offset) % platforms.len();
                round.spawn(single_attempt(
                    self.runner.clone(),
                    platforms.clone(),
                    request.clone(),
                    mode,
                    start,
                ));
            }

            while let Some(joined) = round.join_next().await {
                match joined {
                    Ok(Ok(artifact)) => collected.push(artifact),
                    Ok(Err(attempt_failures)) => failures.extend(attempt_failures),
                    Err(e) => failures.push(AttemptFailure {
                        platform_id: mode.operation().to_string(),
                        message: format!("attempt aborted: {}", e),
                    }),
                }
            }
            attempts += launch;
            rounds += 1;
            info!(
                "{} round {}: filled {}/{} after {} attempts",
                mode.operation(),
                rounds,
                collected.len(),
                desired,
                attempts
            );
            if let Some(tx) = &progress {
                let _ = tx.send(FillProgress {
                    completed: collected.len(),
                    desired,
                    attempts,
                });
            }

            if collected.len() < desired && attempts < max_attempts {
                let delay = self.backoff(rounds);
                warn!("{} short of target, backing off {:?}", mode.operation(), delay);
                tokio::time::sleep(delay).await;
            }
        }

        if collected.len() < desired {
            return Err(RelayError::Shortfall {
                filled: collected.len(),
                desired,
                attempts,
                failures,
            });
        }
        Ok(collected)
    }

    fn backoff(&self, rounds: u32) -> Duration {
        self.config
            .backoff_step
            .saturating_mul(rounds)
            .min(self.config.backoff_cap)
    }
}

/// One image through the failover runner. An upstream answer without an
/// artifact counts as a failed attempt. Errors come back as the per-platform
/// breakdown so the caller can aggregate across rounds.
async fn single_attempt(
    runner: Arc<FailoverRunner>,
    platforms: Arc<[Platform]>,
    request: Arc<ImageRequest>,
    mode: ImageMode,
    start: usize,
) -> Result<GeneratedArtifact, Vec<AttemptFailure>> {
    let result = runner
        .run(mode.operation(), &platforms, start, |_, client| {
            let request = request.clone();
            async move {
                let output = match mode {
                    ImageMode::Edit => client.edit(&request).await?,
                    ImageMode::FromText => client.generate_from_text(&request).await?,
                };
                output
                    .artifacts
                    .into_iter()
                    .next()
                    .ok_or_else(|| RelayError::upstream("no image returned"))
            }
        })
        .await;
    result.map_err(|e| match e {
        RelayError::Failover { failures, .. } => failures,
        other => vec![AttemptFailure {
            platform_id: platforms[start % platforms.len()].id.clone(),
            message: other.to_string(),
        }],
    })
}

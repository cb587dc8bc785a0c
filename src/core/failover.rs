use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::error::{AttemptFailure, RelayError};
use super::platforms::Platform;
use super::provider::{ClientPool, ImageProvider};

/// Outcome of a successful run, with the failures that preceded the winner.
#[derive(Debug)]
pub struct FailoverSuccess<T> {
    pub value: T,
    pub platform_id: String,
    pub failures: Vec<AttemptFailure>,
}

/// Runs one logical call against platforms in rotation until one succeeds.
///
/// Every attempt is a fresh upstream call; a platform is tried at most once
/// per run and nothing a failed platform started is resumed elsewhere.
pub struct FailoverRunner {
    pool: Arc<ClientPool>,
    attempt_timeout: Duration,
}

impl FailoverRunner {
    pub fn new(pool: Arc<ClientPool>, attempt_timeout: Duration) -> Self {
        Self {
            pool,
            attempt_timeout,
        }
    }

    /// Same client pool, different per-attempt ceiling. Long-running
    /// operations such as video polling need more than an image call.
    pub fn with_timeout(&self, attempt_timeout: Duration) -> Self {
        Self {
            pool: self.pool.clone(),
            attempt_timeout,
        }
    }

    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        platforms: &[Platform],
        start_index: usize,
        attempt: F,
    ) -> Result<T, RelayError>
    where
        F: FnMut(Platform, Arc<dyn ImageProvider>) -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        let success = self
            .run_detailed(operation, platforms, start_index, attempt)
            .await?;
        if !success.failures.is_empty() {
            info!(
                "{} succeeded on platform {} after {} failed attempt(s)",
                operation,
                success.platform_id,
                success.failures.len()
            );
        }
        Ok(success.value)
    }

    pub async fn run_detailed<T, F, Fut>(
        &self,
        operation: &str,
        platforms: &[Platform],
        start_index: usize,
        mut attempt: F,
    ) -> Result<FailoverSuccess<T>, RelayError>
    where
        F: FnMut(Platform, Arc<dyn ImageProvider>) -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        if platforms.is_empty() {
            return Err(RelayError::Configuration(
                "no platforms configured".to_string(),
            ));
        }

        let count = platforms.len();
        let mut failures = Vec::new();
        for i in 0..count {
            let platform = &platforms[(start_index + i) % count];
            let outcome = match self.pool.client_for(platform) {
                Ok(client) => {
                    match tokio::time::timeout(self.attempt_timeout, attempt(platform.clone(), client)).await {
                        Ok(result) => result,
                        Err(_) => Err(RelayError::Timeout(self.attempt_timeout)),
                    }
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    return Ok(FailoverSuccess {
                        value,
                        platform_id: platform.id.clone(),
                        failures,
                    });
                }
                Err(e) => {
                    warn!("{} attempt failed on platform {}: {}", operation, platform.id, e);
                    failures.push(AttemptFailure {
                        platform_id: platform.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let err = RelayError::Failover {
            operation: operation.to_string(),
            failures,
        };
        error!("{}", err);
        Err(err)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, fixture};
    use super::*;
    use crate::core::provider::ImageRequest;

    fn first_artifact(
        _: Platform,
        client: Arc<dyn ImageProvider>,
    ) -> impl Future<Output = Result<String, RelayError>> {
        async move {
            let out = client.generate_from_text(&ImageRequest::default()).await?;
            out.artifacts
                .into_iter()
                .next()
                .map(|a| a.data)
                .ok_or_else(|| RelayError::upstream("no image returned"))
        }
    }

    #[tokio::test]
    async fn stops_at_first_success_and_records_prior_failures() {
        let fx = fixture(&[("a", Behavior::Fail), ("b", Behavior::Fail), ("c", Behavior::Succeed)]);
        let runner = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(5));

        let success = runner
            .run_detailed("generate-image", &fx.platforms, 0, first_artifact)
            .await
            .expect("c should succeed");
        assert_eq!(success.value, "c-0");
        assert_eq!(success.platform_id, "c");
        let failed: Vec<_> = success.failures.iter().map(|f| f.platform_id.as_str()).collect();
        assert_eq!(failed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rotation_starts_at_the_given_index() {
        let fx = fixture(&[("a", Behavior::Succeed), ("b", Behavior::Fail), ("c", Behavior::Fail)]);
        let runner = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(5));

        let value = runner
            .run("generate-image", &fx.platforms, 1, first_artifact)
            .await
            .unwrap();
        assert_eq!(value, "a-0");
        assert_eq!(fx.call_log(), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn exhausting_every_platform_names_each_once_in_order() {
        let fx = fixture(&[("a", Behavior::Fail), ("b", Behavior::Fail), ("c", Behavior::Fail)]);
        let runner = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(5));

        let err = runner
            .run("generate-image", &fx.platforms, 2, first_artifact)
            .await
            .unwrap_err();
        let message = err.to_string();
        for id in ["[a]", "[b]", "[c]"] {
            assert_eq!(message.matches(id).count(), 1, "{} should appear once in {}", id, message);
        }
        let (pos_c, pos_a, pos_b) = (
            message.find("[c]").unwrap(),
            message.find("[a]").unwrap(),
            message.find("[b]").unwrap(),
        );
        assert!(pos_c < pos_a && pos_a < pos_b);
        // no platform is retried within one run
        assert_eq!(fx.calls("a") + fx.calls("b") + fx.calls("c"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_rotate_to_the_next_platform() {
        let fx = fixture(&[("slow", Behavior::Hang), ("fast", Behavior::Succeed)]);
        let runner = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(30));

        let success = runner
            .run_detailed("generate-image", &fx.platforms, 0, first_artifact)
            .await
            .unwrap();
        assert_eq!(success.platform_id, "fast");
        assert_eq!(success.failures[0].message, "timed out after 30s");
    }

    #[tokio::test(start_paused = true)]
    async fn a_longer_ceiling_lets_slow_platforms_finish() {
        let fx = fixture(&[("slow", Behavior::Slow(300)), ("fast", Behavior::Succeed)]);
        let short = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(180));
        let long = short.with_timeout(Duration::from_secs(900));

        let success = long
            .run_detailed("generate-video", &fx.platforms, 0, first_artifact)
            .await
            .unwrap();
        assert_eq!(success.platform_id, "slow");
        assert!(success.failures.is_empty());
        assert_eq!(fx.calls("fast"), 0);
    }

    #[tokio::test]
    async fn empty_platform_list_is_a_configuration_error() {
        let fx = fixture(&[]);
        let runner = FailoverRunner::new(fx.pool.clone(), Duration::from_secs(5));
        let err = runner
            .run("generate-image", &[], 0, first_artifact)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::MONITOR_MIN_INTERVAL;
use super::error::RelayError;
use super::lifecycle::LifecycleComponent;
use super::platforms::{Platform, PlatformRegistry};
use super::provider::{ClientPool, DesiredCount, ImageRequest};

const PROBE_PROMPT: &str = "A single small red dot centered on a plain white background.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub platform_id: String,
    pub base_url: String,
    pub model: String,
    pub checked_at: DateTime<Utc>,
    pub ok: bool,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

struct Background {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Real generation probes against every configured platform. Keeps only the
/// latest result per platform.
pub struct HealthMonitor {
    registry: Arc<PlatformRegistry>,
    pool: Arc<ClientPool>,
    probe_timeout: Duration,
    snapshot: Mutex<Vec<MonitorStatus>>,
    background: Mutex<Option<Background>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<PlatformRegistry>, pool: Arc<ClientPool>, probe_timeout: Duration) -> Self {
        Self {
            registry,
            pool,
            probe_timeout,
            snapshot: Mutex::new(Vec::new()),
            background: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Vec<MonitorStatus> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Probe every platform concurrently; results follow platform order.
    pub async fn check_once(&self) -> Result<Vec<MonitorStatus>, RelayError> {
        let platforms = self.registry.list().await?;

        let mut probes = JoinSet::new();
        for (index, platform) in platforms.iter().cloned().enumerate() {
            let pool = self.pool.clone();
            let timeout = self.probe_timeout;
            probes.spawn(async move { (index, probe(pool, platform, timeout).await) });
        }
        let mut results: Vec<Option<MonitorStatus>> = vec![None; platforms.len()];
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, status)) => results[index] = Some(status),
                Err(e) => warn!("Probe task aborted: {}", e),
            }
        }
        let results: Vec<MonitorStatus> = results.into_iter().flatten().collect();

        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        for status in &results {
            match snapshot.iter_mut().find(|s| s.platform_id == status.platform_id) {
                Some(existing) => *existing = status.clone(),
                None => snapshot.push(status.clone()),
            }
        }
        snapshot.retain(|s| platforms.iter().any(|p| p.id == s.platform_id));

        let healthy = results.iter().filter(|s| s.ok).count();
        info!("Health check: {}/{} platforms ok", healthy, results.len());
        Ok(results)
    }

    /// Start periodic checks. Intervals under the floor are raised to it;
    /// a running loop is replaced.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let interval = interval.max(MONITOR_MIN_INTERVAL);
        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.check_once().await {
                            warn!("Health check failed: {}", e);
                        }
                    }
                }
            }
        });
        info!("Health monitor running every {:?}", interval);
        *self.background.lock().unwrap_or_else(|e| e.into_inner()) = Some(Background { cancel, handle });
    }

    /// Idempotent.
    pub fn stop(&self) {
        let previous = self.background.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(bg) = previous {
            bg.cancel.cancel();
            bg.handle.abort();
            info!("Health monitor stopped");
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|bg| !bg.handle.is_finished())
    }
}

/// Lifecycle wrapper that runs the background loop when an interval is set.
pub struct MonitorService {
    monitor: Arc<HealthMonitor>,
    interval: Option<Duration>,
}

impl MonitorService {
    pub fn new(monitor: Arc<HealthMonitor>, interval: Option<Duration>) -> Self {
        Self { monitor, interval }
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for MonitorService {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        match self.interval {
            Some(interval) => self.monitor.start(interval),
            None => info!("Background health monitor disabled"),
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        self.monitor.stop();
        Ok(())
    }
}

async fn probe(pool: Arc<ClientPool>, platform: Platform, timeout: Duration) -> MonitorStatus {
    let started = Instant::now();
    let outcome = match pool.client_for(&platform) {
        Ok(client) => {
            let request = ImageRequest {
                prompt: PROBE_PROMPT.to_string(),
                aspect_ratio: Some("1:1".to_string()),
                count: DesiredCount::clamped(1),
                ..ImageRequest::default()
            };
            match tokio::time::timeout(timeout, client.generate_from_text(&request)).await {
                Ok(Ok(output)) if !output.artifacts.is_empty() => Ok(()),
                Ok(Ok(_)) => Err("no image returned".to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(RelayError::Timeout(timeout).to_string()),
            }
        }
        Err(e) => Err(e.to_string()),
    };
    let latency_ms = started.elapsed().as_millis() as u64;
    if let Err(message) = &outcome {
        warn!("Probe failed for platform {}: {}", platform.id, message);
    }

    MonitorStatus {
        platform_id: platform.id,
        base_url: platform.base_url,
        model: platform.model,
        checked_at: Utc::now(),
        ok: outcome.is_ok(),
        latency_ms,
        error_message: outcome.err(),
    }
}

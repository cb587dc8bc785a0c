use anyhow::Result;
use std::sync::Arc;

use super::config::AppConfig;
use super::dispatch::Dispatcher;
use super::failover::FailoverRunner;
use super::fill::{FillConfig, FillGenerator};
use super::monitor::HealthMonitor;
use super::platforms::PlatformRegistry;
use super::provider::{ClientPool, ProviderRegistry};
use super::session::SessionAuthenticator;
use super::tasks::TaskQueue;

/// Everything one relay instance owns, wired from configuration. Nothing here
/// is process-global; tests build as many instances as they like.
pub struct RelayServices {
    pub config: AppConfig,
    pub sessions: SessionAuthenticator,
    pub platforms: Arc<PlatformRegistry>,
    pub pool: Arc<ClientPool>,
    pub monitor: Arc<HealthMonitor>,
    pub dispatcher: Dispatcher,
}

impl RelayServices {
    pub fn new(config: AppConfig, providers: ProviderRegistry) -> Self {
        let sessions = SessionAuthenticator::new(
            config.session_secret.clone(),
            config.admin_password.clone(),
            config.session_ttl,
        );
        let platforms = Arc::new(PlatformRegistry::new(config.platforms_file()));
        let pool = Arc::new(ClientPool::new(providers));
        let runner = Arc::new(FailoverRunner::new(pool.clone(), config.upstream_timeout));
        let fill = Arc::new(FillGenerator::new(
            runner,
            FillConfig {
                max_attempts: config.fill_max_attempts,
                ..FillConfig::default()
            },
        ));
        let monitor = Arc::new(HealthMonitor::new(
            platforms.clone(),
            pool.clone(),
            config.probe_timeout,
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(TaskQueue::new()),
            platforms.clone(),
            fill,
            config.video_timeout,
            config.max_concurrent_tasks,
        );

        Self {
            config,
            sessions,
            platforms,
            pool,
            monitor,
            dispatcher,
        }
    }

    /// Production wiring: both HTTP providers over one shared connection pool.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("genrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(config, ProviderRegistry::with_defaults(http)))
    }
}

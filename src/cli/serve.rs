use anyhow::Result;
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::monitor::MonitorService;
use crate::core::services::RelayServices;
use crate::core::terminal;
use crate::interfaces::web::ApiServer;
use crate::logging;

pub async fn run_serve(config: AppConfig) -> Result<()> {
    let log_tx = logging::init(config.log_level, false);

    if config.admin_password.is_none() {
        terminal::print_warn(
            "GENRELAY_ADMIN_PASSWORD is not set: login is disabled and admin endpoints are unreachable.",
        );
    }
    if !config.ai_requires_session {
        terminal::print_warn("AI endpoints are open to unauthenticated callers.");
    }

    let monitor_interval = config.monitor_interval;
    let services = Arc::new(RelayServices::from_config(config)?);
    let addr = services.config.bind_addr();
    info!("Starting genrelay on {}", addr);

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        services.clone(),
        log_tx,
    ))));
    lifecycle.attach(Arc::new(Mutex::new(MonitorService::new(
        services.monitor.clone(),
        monitor_interval,
    ))));
    lifecycle.start().await?;

    terminal::print_banner();
    terminal::print_link("API", &format!("http://{}/api", addr));
    terminal::print_link("Health", &format!("http://{}/api/health", addr));
    terminal::print_status("Platforms", &services.platforms.path().display().to_string());
    terminal::print_status(
        "Monitor",
        &match monitor_interval {
            Some(every) => format!("every {}s", every.as_secs()),
            None => "off".to_string(),
        },
    );
    println!("\n {}\n", style("Press Ctrl+C to stop.").dim());

    tokio::signal::ctrl_c().await?;
    println!();
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

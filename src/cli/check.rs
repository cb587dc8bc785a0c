use anyhow::Result;

use crate::core::config::AppConfig;
use crate::core::services::RelayServices;
use crate::core::terminal::{self, print_info, print_success, print_warn};

/// One probe per platform; any failure turns into a non-zero exit.
pub async fn run_check(config: AppConfig) -> Result<()> {
    let services = RelayServices::from_config(config)?;
    let platforms = services.platforms.list().await?;
    if platforms.is_empty() {
        print_warn(&format!(
            "No platforms configured in {}",
            services.platforms.path().display()
        ));
        return Ok(());
    }

    print_info(&format!("Probing {} platform(s)...", platforms.len()));
    let statuses = services.monitor.check_once().await?;
    terminal::print_monitor_table(&statuses);

    let down = statuses.iter().filter(|s| !s.ok).count();
    if down > 0 {
        anyhow::bail!("{} of {} platforms failed the probe", down, statuses.len());
    }
    print_success("All platforms are healthy.");
    Ok(())
}

pub async fn run_list_platforms(config: AppConfig) -> Result<()> {
    let services = RelayServices::from_config(config)?;
    let platforms = services.platforms.list_redacted().await?;
    if platforms.is_empty() {
        print_warn(&format!(
            "No platforms configured in {}",
            services.platforms.path().display()
        ));
        return Ok(());
    }
    terminal::print_platforms(&platforms);
    Ok(())
}

use console::{Emoji, style};

use super::monitor::MonitorStatus;
use super::platforms::RedactedPlatform;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

pub fn print_banner() {
    println!(
        "\n{} {}\n",
        style("genrelay").bold().cyan(),
        style("failover relay for image and video generation").dim()
    );
}

/// A titled block of `command  description` rows for the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows.push((name.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!(" {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, description) in &self.rows {
            println!("   {:<width$}  {}", style(name).green(), description, width = width);
        }
        println!();
    }
}

pub fn print_platforms(platforms: &[RedactedPlatform]) {
    if platforms.is_empty() {
        print_info("No platforms configured.");
        return;
    }
    for p in platforms {
        println!(
            "  {} {}  {}  {}  {}",
            GEAR,
            style(&p.id).bold(),
            p.base_url,
            style(&p.model).cyan(),
            style(&p.credential_preview).dim()
        );
    }
}

pub fn print_monitor_table(statuses: &[MonitorStatus]) {
    for s in statuses {
        let verdict = if s.ok {
            style("ok  ").green().bold()
        } else {
            style("DOWN").red().bold()
        };
        println!(
            "  {} {:<32} {:>7}ms  {}",
            verdict,
            s.platform_id,
            s.latency_ms,
            s.error_message.as_deref().unwrap_or("")
        );
    }
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("genrelay stopped.").bold().cyan());
}

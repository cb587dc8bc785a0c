mod check;
mod serve;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::AppConfig;
use crate::core::terminal::{self, GuideSection};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Start the relay API (and the health monitor, if enabled)")
        .print();

    GuideSection::new("Platforms")
        .command("platforms", "List configured platforms (credentials masked)")
        .command("check", "Probe every platform once and print the results")
        .print();

    GuideSection::new("Flags")
        .command("--host <HOST>", "Bind address (default 127.0.0.1)")
        .command("--port <PORT>", "Bind port (default 8787)")
        .command("--data-dir <DIR>", "Where platforms.json lives (default ~/.genrelay)")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("genrelay").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerFlags {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

/// Hand-rolled flag scan starting at `start`; unknown arguments are skipped and
/// a value that does not parse leaves the current setting alone.
pub(crate) fn parse_server_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
    mut data_dir: PathBuf,
) -> ServerFlags {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data-dir" | "-d" => {
                if i + 1 < args.len() {
                    data_dir = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    ServerFlags {
        host,
        port,
        data_dir,
    }
}

fn load_config(args: &[String]) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    let flags = parse_server_flags(
        args,
        2,
        config.host.clone(),
        config.port,
        config.data_dir.clone(),
    );
    config.host = flags.host;
    config.port = flags.port;
    config.data_dir = flags.data_dir;
    Ok(config)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("serve") | Some("start") => serve::run_serve(load_config(&args)?).await,
        Some("check") => check::run_check(load_config(&args)?).await,
        Some("platforms") => check::run_list_platforms(load_config(&args)?).await,
        Some("help") | Some("--help") | Some("-h") | None => {
            print_help();
            Ok(())
        }
        Some(other) => {
            print_help();
            anyhow::bail!("unknown command '{}'", other)
        }
    }
}

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use crate::core::provider::VIDEO_POLL_MAX_WAIT;
use crate::platform::{NativePlatform, Platform};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
pub const MONITOR_MIN_INTERVAL: Duration = Duration::from_secs(5);
/// Room for submit and download on top of the provider's polling budget.
pub const DEFAULT_VIDEO_TIMEOUT: Duration = Duration::from_secs(VIDEO_POLL_MAX_WAIT.as_secs() + 60);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_password: Option<String>,
    pub session_secret: Option<String>,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    pub ai_requires_session: bool,
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
    /// Per-attempt ceiling for video jobs; never below the polling budget.
    pub video_timeout: Duration,
    pub probe_timeout: Duration,
    /// `None` keeps the background monitor off; manual checks still work.
    pub monitor_interval: Option<Duration>,
    pub fill_max_attempts: usize,
    pub max_concurrent_tasks: usize,
    pub log_level: Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: NativePlatform::data_dir(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            admin_password: None,
            session_secret: None,
            session_ttl: DEFAULT_SESSION_TTL,
            cookie_secure: false,
            ai_requires_session: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            upstream_timeout: Duration::from_secs(180),
            video_timeout: DEFAULT_VIDEO_TIMEOUT,
            probe_timeout: Duration::from_secs(60),
            monitor_interval: None,
            fill_max_attempts: 12,
            max_concurrent_tasks: 4,
            log_level: Level::INFO,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(dir) = get("GENRELAY_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(host) = get("GENRELAY_HOST") {
            cfg.host = host;
        }
        if let Some(port) = get("GENRELAY_PORT") {
            cfg.port = parse_number("GENRELAY_PORT", &port)?;
        }
        cfg.admin_password = get("GENRELAY_ADMIN_PASSWORD");
        cfg.session_secret = get("GENRELAY_SESSION_SECRET");
        if let Some(ttl) = get("GENRELAY_SESSION_TTL_SECS") {
            cfg.session_ttl = Duration::from_secs(parse_number("GENRELAY_SESSION_TTL_SECS", &ttl)?);
        }
        if let Some(v) = get("GENRELAY_COOKIE_SECURE") {
            cfg.cookie_secure = parse_bool("GENRELAY_COOKIE_SECURE", &v)?;
        }
        if let Some(v) = get("GENRELAY_AI_REQUIRE_SESSION") {
            cfg.ai_requires_session = parse_bool("GENRELAY_AI_REQUIRE_SESSION", &v)?;
        }
        if let Some(v) = get("GENRELAY_MAX_BODY_BYTES") {
            cfg.max_body_bytes = parse_number("GENRELAY_MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = get("GENRELAY_UPSTREAM_TIMEOUT_SECS") {
            cfg.upstream_timeout =
                Duration::from_secs(parse_number("GENRELAY_UPSTREAM_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("GENRELAY_VIDEO_TIMEOUT_SECS") {
            let secs = parse_number("GENRELAY_VIDEO_TIMEOUT_SECS", &v)?;
            cfg.video_timeout = Duration::from_secs(secs).max(VIDEO_POLL_MAX_WAIT);
        }
        if let Some(v) = get("GENRELAY_PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout = Duration::from_secs(parse_number("GENRELAY_PROBE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("GENRELAY_MONITOR_INTERVAL_SECS") {
            let secs: u64 = parse_number("GENRELAY_MONITOR_INTERVAL_SECS", &v)?;
            cfg.monitor_interval = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs).max(MONITOR_MIN_INTERVAL))
            };
        }
        if let Some(v) = get("GENRELAY_FILL_MAX_ATTEMPTS") {
            cfg.fill_max_attempts = parse_number("GENRELAY_FILL_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("GENRELAY_MAX_CONCURRENT_TASKS") {
            cfg.max_concurrent_tasks = parse_number::<usize>("GENRELAY_MAX_CONCURRENT_TASKS", &v)?.max(1);
        }
        if let Some(v) = get("GENRELAY_LOG_LEVEL") {
            cfg.log_level = v
                .parse()
                .map_err(|_| anyhow!("GENRELAY_LOG_LEVEL: unknown level '{}'", v))?;
        }

        Ok(cfg)
    }

    pub fn platforms_file(&self) -> PathBuf {
        self.data_dir.join("platforms.json")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{}: expected a non-negative integer, got '{}'", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{}: expected a boolean, got '{}'", key, value)),
    }
}

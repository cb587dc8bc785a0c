use std::path::{Path, PathBuf};

/// OS-specific filesystem concerns behind a common interface so call sites
/// stay free of `#[cfg]` blocks.
pub trait Platform {
    /// Set owner-only *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set owner-only *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory for genrelay.
    /// Unix: `~/.genrelay`, Windows: `%APPDATA%\genrelay`.
    fn data_dir() -> PathBuf;
}

/// Falls back to the current directory when no home directory is known.
fn resolve_data_dir(base: Option<PathBuf>, leaf: &str) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(leaf)
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;

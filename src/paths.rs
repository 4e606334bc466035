//! Directory layout for dockhand.
//!
//! Provides a single `DockhandPaths` struct that resolves all standard
//! directories and ensures they exist on demand:
//!
//! - Config:    `~/.config/dockhand/`  (holds `dockhand.toml`)
//! - Data:      `~/Library/Application Support/dockhand/` on macOS,
//!              `$XDG_DATA_HOME/dockhand/` elsewhere (holds the launcher script)
//! - Logs:      `~/Library/Logs/dockhand/` on macOS, `<data>/logs/` elsewhere
//!
//! docker-machine keeps its certificates under `~/.docker/machine/machines/`
//! regardless of platform; [`default_cert_base`] resolves that.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::machine::dispatch::LAUNCHER_FILE_NAME;

const APP_NAME: &str = "dockhand";

/// Name of the settings file inside the config directory.
pub const SETTINGS_FILE_NAME: &str = "dockhand.toml";

/// All resolved application directory paths.
#[derive(Debug, Clone)]
pub struct DockhandPaths {
    /// Human-editable config: `~/.config/dockhand/`
    pub config: PathBuf,
    /// Machine-managed data root
    pub data: PathBuf,
    /// Application logs
    pub logs: PathBuf,
}

impl DockhandPaths {
    /// Resolve all paths from the user's home directory.
    /// Does not create any directories; call `ensure()` for that.
    pub fn resolve() -> Option<Self> {
        let home = home_dir()?;

        Some(Self {
            config: resolve_config_dir(&home),
            data: resolve_data_dir(&home),
            logs: resolve_log_dir(&home),
        })
    }

    /// Create all directories that don't already exist.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.data, &self.logs] {
            std::fs::create_dir_all(dir)?;
            info!("ensured directory: {}", dir.display());
        }
        Ok(())
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config.join(SETTINGS_FILE_NAME)
    }

    /// Default location of the transient launcher script.
    pub fn launcher_script(&self) -> PathBuf {
        self.data.join(LAUNCHER_FILE_NAME)
    }
}

/// Base directory under which docker-machine keeps per-machine certificates.
pub fn default_cert_base() -> Option<PathBuf> {
    Some(
        home_dir()?
            .join(".docker")
            .join("machine")
            .join("machines"),
    )
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var("USERPROFILE").ok().map(PathBuf::from)
}

#[cfg(not(windows))]
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// Platform-specific path resolution
// ---------------------------------------------------------------------------

fn resolve_config_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join(APP_NAME)
    } else {
        home.join(".config").join(APP_NAME)
    }
}

#[cfg(target_os = "macos")]
fn resolve_data_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Application Support").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
fn resolve_data_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join(APP_NAME)
    } else {
        home.join(".local").join("share").join(APP_NAME)
    }
}

#[cfg(target_os = "macos")]
fn resolve_log_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Logs").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
fn resolve_log_dir(home: &Path) -> PathBuf {
    resolve_data_dir(home).join("logs")
}

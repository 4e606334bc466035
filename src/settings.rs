//! Persistent settings for dockhand.
//!
//! All knobs live in a single `Settings` struct that serializes to/from
//! TOML (`~/.config/dockhand/dockhand.toml`). Every field has a default, so
//! a partial file, or no file at all, is fine. Command-line flags override
//! whatever is loaded here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::docker::BuildFiles;
use crate::machine::DispatchMode;
use crate::machine::command::SHARED_FOLDER_ROOT;
use crate::machine::manager::{DEFAULT_DISK_SIZE_MB, DEFAULT_MEMORY_MB};

/// Root settings container.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Settings {
    /// docker-machine VM name.
    pub machine_name: String,
    /// Certificate base directory. Defaults to `~/.docker/machine/machines`.
    pub cert_path: Option<PathBuf>,
    /// Value exported as `DOCKER_TLS_VERIFY`.
    pub tls_verify: String,
    /// Directory containing `VBoxManage`. Defaults to `PATH` lookup
    /// (the standard install directory on Windows).
    pub virtualbox_path: Option<PathBuf>,
    /// Host folder the VM mounts by default.
    pub shared_folder_root: String,
    pub memory_mb: u32,
    pub disk_size_mb: u32,
    pub dispatch: DispatchMode,
    /// Launcher script location. Defaults to the data directory.
    pub script_path: Option<PathBuf>,
    /// Pre-build hook script name looked up in the build directory.
    pub build_hook: String,
    /// Version file name looked up in the build directory.
    pub version_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        let build_files = BuildFiles::default();
        Self {
            machine_name: "default".to_string(),
            cert_path: None,
            tls_verify: "1".to_string(),
            virtualbox_path: None,
            shared_folder_root: SHARED_FOLDER_ROOT.to_string(),
            memory_mb: DEFAULT_MEMORY_MB,
            disk_size_mb: DEFAULT_DISK_SIZE_MB,
            dispatch: DispatchMode::default(),
            script_path: None,
            build_hook: build_files.hook,
            version_file: build_files.version_file,
        }
    }
}

impl Settings {
    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialize from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load settings from `path`, falling back to defaults when the file
    /// does not exist. A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("parse settings {}", path.display()))
    }

    pub fn build_files(&self) -> BuildFiles {
        BuildFiles {
            hook: self.build_hook.clone(),
            version_file: self.version_file.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

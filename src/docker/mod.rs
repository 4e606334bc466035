//! Container engine operations against a resolved docker-machine endpoint.
//!
//! A [`Docker`] client and the resource handles it hands out
//! ([`DockerImage`], [`DockerContainer`], [`DockerVolume`]) share one
//! [`EngineContext`]: the engine environment captured when the client was
//! created, the dispatcher, and the shared folder root used for volumes.
//! Handles never cache the state of the resource they name.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::machine::dispatch::{DispatchError, Dispatcher};
use crate::machine::env::EngineEnv;

pub mod client;
pub mod container;
pub mod image;
pub mod registry;
pub mod version;
pub mod volume;

// ---------------------------------------------------------------------------
// Shared types used across submodules
// ---------------------------------------------------------------------------

/// Everything a handle needs to dispatch a command at the right engine.
pub struct EngineContext {
    env: EngineEnv,
    dispatcher: Arc<dyn Dispatcher>,
    shared_folder_root: String,
}

impl EngineContext {
    pub fn new(env: EngineEnv, dispatcher: Arc<dyn Dispatcher>, shared_folder_root: String) -> Self {
        Self {
            env,
            dispatcher,
            shared_folder_root,
        }
    }

    pub fn env(&self) -> &EngineEnv {
        &self.env
    }

    pub fn shared_folder_root(&self) -> &str {
        &self.shared_folder_root
    }

    /// Fire-and-forget dispatch under the engine environment.
    pub async fn call(&self, cmd: &str) -> Result<()> {
        self.call_with(&self.env, cmd).await
    }

    /// Fire-and-forget dispatch under an explicit environment.
    pub async fn call_with(&self, env: &EngineEnv, cmd: &str) -> Result<()> {
        self.dispatcher
            .call(env, cmd)
            .await
            .with_context(|| format!("dispatch `{cmd}`"))
    }

    /// Capture-mode dispatch; non-zero exit is an error.
    pub async fn capture(&self, cmd: &str) -> Result<String> {
        Ok(self.capture_typed(cmd).await?)
    }

    /// Capture-mode dispatch keeping the typed error for classification.
    pub async fn capture_typed(&self, cmd: &str) -> Result<String, DispatchError> {
        self.dispatcher.capture(&self.env, cmd).await
    }
}

/// Outcome of an existence check.
///
/// A failing tool is not the same as a missing resource, so the two are kept
/// apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    /// The check itself failed; the reason is the tool's diagnostic.
    Unknown(String),
}

impl Presence {
    /// Classify a failed inspection: `Absent` when the tool said the object
    /// does not exist, `Unknown` otherwise.
    pub fn from_failure(err: &DispatchError) -> Self {
        match err.tool_output() {
            Some(output) if output.to_lowercase().contains("no such") => Presence::Absent,
            _ => Presence::Unknown(err.to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present)
    }
}

/// Default pre-build hook, in the launcher interpreter's script dialect.
#[cfg(windows)]
pub const DEFAULT_BUILD_HOOK: &str = "build.cmd";

#[cfg(not(windows))]
pub const DEFAULT_BUILD_HOOK: &str = "build.sh";

/// File names the build step looks for in the build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFiles {
    /// Pre-build hook script, run from inside the build directory.
    pub hook: String,
    /// Three-component version file whose patch number is bumped per build.
    pub version_file: String,
}

impl Default for BuildFiles {
    fn default() -> Self {
        Self {
            hook: DEFAULT_BUILD_HOOK.to_string(),
            version_file: ".version".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use client::Docker;
pub use container::DockerContainer;
pub use image::DockerImage;
pub use volume::{DockerVolume, VolumeInfo};

//! Process dispatch for formatted command strings.
//!
//! ## Architecture
//!
//! ```text
//! command string + EngineEnv
//!     └─► Dispatcher
//!             ├─► ScriptDispatcher  writes launcher script → sh <script> / cmd /C <script>
//!             └─► ShellDispatcher   sh -c <command>         / cmd /C <command>
//! ```
//!
//! The script indirection exists because elevated rights on some Windows
//! hosts only propagate to a generated script file, not to a direct
//! invocation. Everywhere else [`ShellDispatcher`] behaves the same.
//!
//! Dispatch is strictly sequential: the launcher script is a single file
//! overwritten on every call and never cleaned up.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use super::env::EngineEnv;

/// Failure to run a command, or a captured command exiting non-zero.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to write launcher script {}: {source}", .path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("output of `{command}` is not valid UTF-8")]
    Decode {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl DispatchError {
    /// Diagnostic text the tool printed before failing, if any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            DispatchError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Executes command strings under an engine environment.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run `command` and wait for it. Output goes to the inherited stdio and
    /// a non-zero exit is only logged.
    async fn call(&self, env: &EngineEnv, command: &str) -> Result<(), DispatchError>;

    /// Run `command`, capture stdout and return the text following the
    /// first echo of `command` in it, trimmed. A non-zero exit is an error.
    async fn capture(&self, env: &EngineEnv, command: &str) -> Result<String, DispatchError>;
}

/// Which [`Dispatcher`] implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Write a launcher script and run it.
    #[default]
    Script,
    /// Hand the command to the shell directly.
    Shell,
}

/// Build the dispatcher for `mode`. `script_path` is only used by
/// [`DispatchMode::Script`].
pub fn dispatcher_for(mode: DispatchMode, script_path: PathBuf) -> Arc<dyn Dispatcher> {
    match mode {
        DispatchMode::Script => Arc::new(ScriptDispatcher::new(script_path)),
        DispatchMode::Shell => Arc::new(ShellDispatcher),
    }
}

/// Strip the tool's echo of its own invocation from captured output.
///
/// Output that never echoes the command is returned whole, trimmed.
pub fn strip_echoed_command(output: &str, command: &str) -> String {
    match output.split_once(command) {
        Some((_, rest)) => rest.trim().to_string(),
        None => output.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Launcher script
// ---------------------------------------------------------------------------

/// File name of the launcher script for this platform.
#[cfg(windows)]
pub const LAUNCHER_FILE_NAME: &str = "command.cmd";

#[cfg(not(windows))]
pub const LAUNCHER_FILE_NAME: &str = "command.sh";

/// Contents of the launcher script wrapping `command`.
#[cfg(windows)]
pub fn launcher_script(command: &str) -> String {
    format!("CALL {command}")
}

#[cfg(not(windows))]
pub fn launcher_script(command: &str) -> String {
    format!("#!/bin/sh\n{command}\n")
}

#[cfg(windows)]
fn interpreter(target: &std::ffi::OsStr) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(target);
    cmd
}

#[cfg(not(windows))]
fn script_interpreter(script: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg(script);
    cmd
}

#[cfg(windows)]
fn script_interpreter(script: &Path) -> Command {
    interpreter(script.as_os_str())
}

#[cfg(not(windows))]
fn shell_interpreter(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_interpreter(command: &str) -> Command {
    interpreter(std::ffi::OsStr::new(command))
}

/// Writes every command to a launcher script before running it.
#[derive(Debug, Clone)]
pub struct ScriptDispatcher {
    script_path: PathBuf,
}

impl ScriptDispatcher {
    pub fn new(script_path: PathBuf) -> Self {
        Self { script_path }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    async fn write_launcher(&self, command: &str) -> Result<(), DispatchError> {
        let to_err = |source| DispatchError::Script {
            path: self.script_path.clone(),
            source,
        };

        if let Some(parent) = self.script_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
            }
        }

        tokio::fs::write(&self.script_path, launcher_script(command))
            .await
            .map_err(to_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.script_path, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(to_err)?;
        }

        Ok(())
    }
}

#[async_trait]
impl Dispatcher for ScriptDispatcher {
    async fn call(&self, env: &EngineEnv, command: &str) -> Result<(), DispatchError> {
        self.write_launcher(command).await?;
        run_inherited(script_interpreter(&self.script_path), env, command).await
    }

    async fn capture(&self, env: &EngineEnv, command: &str) -> Result<String, DispatchError> {
        self.write_launcher(command).await?;
        run_captured(script_interpreter(&self.script_path), env, command).await
    }
}

/// Runs commands straight through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellDispatcher;

#[async_trait]
impl Dispatcher for ShellDispatcher {
    async fn call(&self, env: &EngineEnv, command: &str) -> Result<(), DispatchError> {
        run_inherited(shell_interpreter(command), env, command).await
    }

    async fn capture(&self, env: &EngineEnv, command: &str) -> Result<String, DispatchError> {
        run_captured(shell_interpreter(command), env, command).await
    }
}

// ---------------------------------------------------------------------------
// Shared runners
// ---------------------------------------------------------------------------

async fn run_inherited(mut cmd: Command, env: &EngineEnv, command: &str) -> Result<(), DispatchError> {
    debug!(command, "dispatching");

    let status = cmd
        .env_clear()
        .envs(env.iter())
        .status()
        .await
        .map_err(|source| DispatchError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !status.success() {
        warn!(command, exit_status = ?status.code(), "command exited non-zero (ignored)");
    }

    Ok(())
}

async fn run_captured(mut cmd: Command, env: &EngineEnv, command: &str) -> Result<String, DispatchError> {
    debug!(command, "dispatching (capture)");

    let output = cmd
        .env_clear()
        .envs(env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| DispatchError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DispatchError::Failed {
            command: command.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout).map_err(|source| DispatchError::Decode {
        command: command.to_string(),
        source,
    })?;

    Ok(strip_echoed_command(&stdout, command))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! docker-machine VM management.
//!
//! [`DockerMachine`] owns the VM descriptor (name, certificate base, TLS
//! flag) and the lifecycle state machine that records where the engine
//! endpoint currently points. Every command it dispatches carries the
//! environment derived from that state.
//!
//! ## Provisioning
//!
//! ```text
//! exists?  ── yes ─► [start if stopped] ► regenerate-certs ► resolve tcp://<ip>:2376
//!    │
//!    no
//!    ▼
//! create ► resolve <ip> ► [mkdir share, stop, sharedfolder add, symlinks]
//!        ► start ► resolve tcp://<ip>:2376 ► regenerate-certs
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use statig::prelude::*;
use tracing::{debug, info, warn};

use super::command;
use super::dispatch::{DispatchError, Dispatcher};
use super::env::{EngineEnv, HostEndpoint, MachineIdentity};
use super::virtualbox::{DEFAULT_SHARED_FOLDER, VirtualBoxDriver};
use crate::docker::{BuildFiles, Docker, EngineContext};
use crate::state_machine::machine_sm::{LifecycleEvent, MachineLifecycle, State};

/// Default VM memory in megabytes.
pub const DEFAULT_MEMORY_MB: u32 = 1024;

/// Default VM disk size in megabytes.
pub const DEFAULT_DISK_SIZE_MB: u32 = 100_000;

/// Classified output of `docker-machine status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStatus {
    Running,
    Stopped,
    /// Any other state docker-machine reports (`Saved`, `Error`, ...).
    Other(String),
    /// docker-machine reported that the host does not exist.
    Absent,
    /// The status query itself failed for another reason.
    Unknown(String),
}

impl MachineStatus {
    /// Classify the captured result of a status query.
    pub fn classify(result: Result<String, DispatchError>) -> Self {
        match result {
            Ok(out) => match out.trim() {
                "Running" => MachineStatus::Running,
                "Stopped" => MachineStatus::Stopped,
                "" => MachineStatus::Unknown("empty status output".to_string()),
                other => MachineStatus::Other(other.to_string()),
            },
            Err(err) => match err.tool_output() {
                Some(output) if output.to_lowercase().contains("does not exist") => {
                    MachineStatus::Absent
                }
                _ => MachineStatus::Unknown(err.to_string()),
            },
        }
    }

    /// `Some(true)` when the VM exists, `None` when that cannot be told.
    pub fn exists(&self) -> Option<bool> {
        match self {
            MachineStatus::Absent => Some(false),
            MachineStatus::Unknown(_) => None,
            _ => Some(true),
        }
    }
}

/// Sizing and shared-folder options for [`DockerMachine::provision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Host folder to share into the VM. Created locally if missing.
    pub shared_folder: Option<PathBuf>,
    /// Allow symlink creation inside the shared folder.
    pub symlinks: bool,
    pub memory_mb: u32,
    pub disk_size_mb: u32,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            shared_folder: None,
            symlinks: true,
            memory_mb: DEFAULT_MEMORY_MB,
            disk_size_mb: DEFAULT_DISK_SIZE_MB,
        }
    }
}

/// A docker-machine VM driven through the VirtualBox driver.
pub struct DockerMachine {
    identity: MachineIdentity,
    driver: VirtualBoxDriver,
    dispatcher: Arc<dyn Dispatcher>,
    lifecycle: StateMachine<MachineLifecycle>,
    shared_folder_root: String,
    build_files: BuildFiles,
}

impl DockerMachine {
    pub fn new(
        identity: MachineIdentity,
        driver: VirtualBoxDriver,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let lifecycle = MachineLifecycle::new(identity.name.clone()).state_machine();
        Self {
            identity,
            driver,
            dispatcher,
            lifecycle,
            shared_folder_root: command::SHARED_FOLDER_ROOT.to_string(),
            build_files: BuildFiles::default(),
        }
    }

    /// Override the host folder that bare volume specs resolve against.
    pub fn with_shared_folder_root(mut self, root: impl Into<String>) -> Self {
        self.shared_folder_root = root.into();
        self
    }

    /// Override the build hook and version file names used by clients.
    pub fn with_build_files(mut self, build_files: BuildFiles) -> Self {
        self.build_files = build_files;
        self
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn lifecycle_state(&self) -> &State {
        self.lifecycle.state()
    }

    pub fn endpoint(&self) -> HostEndpoint {
        MachineLifecycle::endpoint(self.lifecycle.state())
    }

    /// Environment matching the currently resolved endpoint.
    pub fn env(&self) -> EngineEnv {
        EngineEnv::for_machine(&self.identity, &self.endpoint())
    }

    /// The four engine variables, for printing as shell exports.
    pub fn env_overrides(&self) -> [(&'static str, String); 4] {
        EngineEnv::overrides(&self.identity, &self.endpoint())
    }

    async fn call(&self, cmd: String) -> Result<()> {
        self.dispatcher
            .call(&self.env(), &cmd)
            .await
            .with_context(|| format!("machine '{}': {cmd}", self.identity.name))
    }

    fn record(&mut self, event: LifecycleEvent) {
        self.lifecycle.handle(&event);
        debug!(machine = %self.identity.name, ?event, state = ?self.lifecycle.state(), "lifecycle");
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current VM address, or `None` when docker-machine cannot report one.
    pub async fn ip(&self) -> Result<Option<String>> {
        let cmd = command::machine_ip(&self.identity.name);
        match self.dispatcher.capture(&self.env(), &cmd).await {
            Ok(ip) if ip.is_empty() => Ok(None),
            Ok(ip) => Ok(Some(ip)),
            Err(err @ DispatchError::Failed { .. }) => {
                warn!(machine = %self.identity.name, error = %err, "no address for machine");
                Ok(None)
            }
            Err(err) => Err(err).context("failed to query machine address"),
        }
    }

    /// TLS engine endpoint for the current address.
    pub async fn tcp_endpoint(&self) -> Result<Option<HostEndpoint>> {
        Ok(self.ip().await?.map(|ip| HostEndpoint::tls_for(&ip)))
    }

    /// Query and classify the VM status, recording it in the lifecycle.
    pub async fn status(&mut self) -> MachineStatus {
        let cmd = command::machine_status(&self.identity.name);
        let status = MachineStatus::classify(self.dispatcher.capture(&self.env(), &cmd).await);

        match &status {
            MachineStatus::Running | MachineStatus::Stopped | MachineStatus::Absent => {
                self.record(LifecycleEvent::Observed(status.clone()));
            }
            MachineStatus::Other(state) => {
                info!(machine = %self.identity.name, state = %state, "machine in transitional state");
            }
            MachineStatus::Unknown(reason) => {
                warn!(machine = %self.identity.name, reason = %reason, "machine status unknown");
            }
        }

        status
    }

    /// Whether the VM exists. Errors when the status query itself failed.
    pub async fn exists(&mut self) -> Result<bool> {
        match self.status().await {
            MachineStatus::Unknown(reason) => {
                bail!("cannot tell whether machine '{}' exists: {reason}", self.identity.name)
            }
            status => Ok(status.exists().unwrap_or(false)),
        }
    }

    // -----------------------------------------------------------------------
    // Single steps
    // -----------------------------------------------------------------------

    pub async fn create(&mut self, memory_mb: u32, disk_size_mb: u32) -> Result<()> {
        info!(machine = %self.identity.name, memory_mb, disk_size_mb, "creating machine");
        self.call(command::machine_create(
            self.driver.driver_name(),
            memory_mb,
            disk_size_mb,
            &self.identity.name,
        ))
        .await?;
        self.record(LifecycleEvent::Created);
        Ok(())
    }

    pub async fn start(&mut self) -> Result<()> {
        info!(machine = %self.identity.name, "starting machine");
        self.call(command::machine_start(&self.identity.name)).await?;
        self.record(LifecycleEvent::Started);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!(machine = %self.identity.name, "stopping machine");
        self.call(command::machine_stop(&self.identity.name)).await?;
        self.record(LifecycleEvent::Halted);
        Ok(())
    }

    pub async fn delete(&mut self) -> Result<()> {
        info!(machine = %self.identity.name, "removing machine");
        self.call(command::machine_remove(&self.identity.name)).await?;
        self.record(LifecycleEvent::Deleted);
        Ok(())
    }

    pub async fn regenerate_certs(&mut self) -> Result<()> {
        info!(machine = %self.identity.name, "regenerating certificates");
        self.call(command::machine_regenerate_certs(&self.identity.name))
            .await?;
        self.record(LifecycleEvent::CertsRegenerated);
        Ok(())
    }

    pub async fn sharedfolder_add(&self, host_path: &Path) -> Result<()> {
        self.call(self.driver.sharedfolder_add(
            &self.identity.name,
            host_path,
            DEFAULT_SHARED_FOLDER,
        ))
        .await
    }

    pub async fn sharedfolder_remove(&self) -> Result<()> {
        self.call(
            self.driver
                .sharedfolder_remove(&self.identity.name, DEFAULT_SHARED_FOLDER),
        )
        .await
    }

    pub async fn sharedfolder_symlinks(&self, enabled: bool) -> Result<()> {
        self.call(self.driver.sharedfolder_symlinks(
            &self.identity.name,
            DEFAULT_SHARED_FOLDER,
            enabled,
        ))
        .await
    }

    /// Point the environment at the bare VM address.
    pub async fn resolve_raw_address(&mut self) -> Result<HostEndpoint> {
        let endpoint = match self.ip().await? {
            Some(ip) => HostEndpoint::RawAddress(ip),
            None => HostEndpoint::Unresolved,
        };
        self.record(LifecycleEvent::Resolved(endpoint.clone()));
        Ok(endpoint)
    }

    /// Point the environment at `tcp://<ip>:2376`.
    pub async fn resolve_tls(&mut self) -> Result<HostEndpoint> {
        let endpoint = self
            .tcp_endpoint()
            .await?
            .unwrap_or(HostEndpoint::Unresolved);
        self.record(LifecycleEvent::Resolved(endpoint.clone()));
        Ok(endpoint)
    }

    // -----------------------------------------------------------------------
    // Composite operations
    // -----------------------------------------------------------------------

    /// Bring the VM to a running, TLS-ready state, creating it if needed.
    ///
    /// Returns the resolved engine endpoint.
    pub async fn provision(&mut self, opts: &ProvisionOptions) -> Result<HostEndpoint> {
        let status = self.status().await;
        match status {
            MachineStatus::Unknown(reason) => {
                bail!(
                    "cannot provision machine '{}': status unknown ({reason})",
                    self.identity.name
                );
            }
            MachineStatus::Absent => self.provision_new(opts).await?,
            existing => {
                info!(machine = %self.identity.name, status = ?existing, "machine exists, reusing");
                if existing == MachineStatus::Stopped {
                    self.start().await?;
                }
                self.regenerate_certs().await?;
                self.resolve_tls().await?;
            }
        }

        let endpoint = self.endpoint();
        if MachineLifecycle::is_tls_ready(self.lifecycle.state()) {
            info!(machine = %self.identity.name, host = %endpoint, "machine ready");
        } else {
            warn!(machine = %self.identity.name, host = %endpoint, "machine provisioned without a TLS endpoint");
        }
        Ok(endpoint)
    }

    async fn provision_new(&mut self, opts: &ProvisionOptions) -> Result<()> {
        self.create(opts.memory_mb, opts.disk_size_mb).await?;
        self.resolve_raw_address().await?;

        if let Some(folder) = &opts.shared_folder {
            if !folder.exists() {
                tokio::fs::create_dir_all(folder)
                    .await
                    .with_context(|| format!("create shared folder {}", folder.display()))?;
            }

            self.stop().await?;
            self.sharedfolder_add(folder).await?;
            if opts.symlinks {
                self.sharedfolder_symlinks(true).await?;
            }
        }

        self.start().await?;
        self.resolve_tls().await?;
        self.regenerate_certs().await?;
        Ok(())
    }

    /// Delete the VM. Shared folders and local files are left alone.
    pub async fn teardown(&mut self) -> Result<()> {
        self.delete().await
    }

    /// Attach to an already provisioned VM: check it is running and point
    /// the environment at its TLS endpoint.
    pub async fn connect(&mut self) -> Result<HostEndpoint> {
        match self.status().await {
            MachineStatus::Running => {}
            MachineStatus::Unknown(reason) => {
                bail!("cannot reach machine '{}': {reason}", self.identity.name)
            }
            MachineStatus::Absent => {
                bail!("machine '{}' does not exist; provision it first", self.identity.name)
            }
            other => bail!("machine '{}' is not running ({other:?})", self.identity.name),
        }
        self.resolve_tls().await
    }

    /// A container-engine client bound to this VM's TLS endpoint.
    ///
    /// Connects first when the endpoint is not TLS yet.
    pub async fn docker_client(&mut self) -> Result<Docker> {
        if !self.endpoint().is_tls() {
            self.connect().await?;
        }

        let endpoint = self.endpoint();
        if !endpoint.is_tls() {
            bail!(
                "machine '{}' has no engine endpoint; is it running?",
                self.identity.name
            );
        }

        let ctx = EngineContext::new(
            self.env(),
            Arc::clone(&self.dispatcher),
            self.shared_folder_root.clone(),
        );
        Ok(Docker::new(Arc::new(ctx), self.build_files.clone()))
    }
}

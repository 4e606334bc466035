//! Integration tests against a real docker-machine VM.
//!
//! These tests create a VirtualBox VM through `docker-machine`, run a
//! container in it and delete the VM again. They need `docker-machine`,
//! `VBoxManage` and `docker` on `PATH` and take several minutes, so they are
//! gated with the `machine-integration-tests` feature flag.
//!
//! # Running
//!
//! ```bash
//! cargo test --features machine-integration-tests --test machine_integration -- --test-threads=1
//! ```
//!
//! `DOCKHAND_TEST_MACHINE` overrides the VM name (default
//! `dockhand-integration`). An existing VM with that name is reused and
//! deleted at the end.

#![cfg(feature = "machine-integration-tests")]

use std::path::PathBuf;

use anyhow::{Context, Result};

use dockhand::docker::Presence;
use dockhand::machine::command::{RunOptions, VolumeSpec};
use dockhand::machine::dispatch::dispatcher_for;
use dockhand::machine::{
    DispatchMode, DockerMachine, HostEndpoint, MachineIdentity, MachineStatus, ProvisionOptions,
    VirtualBoxDriver,
};
use dockhand::paths::default_cert_base;

// ---------------------------------------------------------------------------
// Environment variable helpers
// ---------------------------------------------------------------------------

fn test_machine_name() -> String {
    std::env::var("DOCKHAND_TEST_MACHINE").unwrap_or_else(|_| "dockhand-integration".to_string())
}

/// Dispatch mode under test; `DOCKHAND_TEST_DISPATCH=shell` skips the
/// launcher script.
fn test_dispatch_mode() -> DispatchMode {
    match std::env::var("DOCKHAND_TEST_DISPATCH").as_deref() {
        Ok("shell") => DispatchMode::Shell,
        _ => DispatchMode::Script,
    }
}

// ---------------------------------------------------------------------------
// TestMachine helper
// ---------------------------------------------------------------------------

/// A VM for a single test, plus the temp dir holding its launcher script.
struct TestMachine {
    machine: DockerMachine,
    _tmp: tempfile::TempDir,
}

impl TestMachine {
    fn new() -> Result<Self> {
        let tmp = tempfile::TempDir::new().context("create temp dir for launcher script")?;
        let identity = MachineIdentity {
            name: test_machine_name(),
            cert_base: default_cert_base().context("HOME must be set")?,
            tls_verify: "1".to_string(),
        };
        let dispatcher = dispatcher_for(test_dispatch_mode(), tmp.path().join("command.sh"));
        let machine = DockerMachine::new(identity, VirtualBoxDriver::default(), dispatcher);
        Ok(Self { machine, _tmp: tmp })
    }

    /// Provision with a small disk so creation stays quick.
    async fn provision(&mut self) -> Result<HostEndpoint> {
        self.machine
            .provision(&ProvisionOptions {
                disk_size_mb: 5_000,
                ..ProvisionOptions::default()
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provision_run_and_teardown() -> Result<()> {
    let mut vm = TestMachine::new()?;

    let endpoint = vm.provision().await?;
    assert!(endpoint.is_tls(), "expected a TLS endpoint, got {endpoint}");
    assert_eq!(vm.machine.status().await, MachineStatus::Running);

    // A second provision reuses the VM.
    let again = vm.provision().await?;
    assert_eq!(again, endpoint);

    let docker = vm.machine.docker_client().await?;
    let volume = docker.volume("dockhand-it");
    volume.create().await?;
    assert_eq!(volume.exists().await, Presence::Present);

    let opts = RunOptions {
        volumes: vec![VolumeSpec::Guest("/data".into())],
        container_name: Some("dockhand-it".into()),
        ..RunOptions::default()
    };
    docker.image("busybox", "latest").run(&opts).await?;

    volume.remove().await?;
    assert_eq!(volume.exists().await, Presence::Absent);

    vm.machine.teardown().await?;
    assert_eq!(vm.machine.status().await, MachineStatus::Absent);
    Ok(())
}

#[tokio::test]
async fn missing_machine_has_no_client() -> Result<()> {
    let identity = MachineIdentity {
        name: "dockhand-does-not-exist".to_string(),
        cert_base: PathBuf::from("/nonexistent"),
        tls_verify: "1".to_string(),
    };
    let tmp = tempfile::TempDir::new()?;
    let mut machine = DockerMachine::new(
        identity,
        VirtualBoxDriver::default(),
        dispatcher_for(DispatchMode::Shell, tmp.path().join("command.sh")),
    );

    assert_eq!(machine.status().await, MachineStatus::Absent);
    assert!(machine.docker_client().await.is_err());
    Ok(())
}

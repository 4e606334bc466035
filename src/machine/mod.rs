//! docker-machine VM management for dockhand.
//!
//! Provides the engine environment, command formatting for `docker`,
//! `docker-machine` and `VBoxManage`, process dispatch, and the
//! [`DockerMachine`] provisioning flow built on top of them.

pub mod command;
pub mod dispatch;
pub mod env;
pub mod manager;
pub mod virtualbox;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use dispatch::{DispatchError, DispatchMode, Dispatcher, ScriptDispatcher, ShellDispatcher};
pub use env::{EngineEnv, HostEndpoint, MachineIdentity};
pub use manager::{DockerMachine, MachineStatus, ProvisionOptions};
pub use virtualbox::VirtualBoxDriver;

//! dockhand: drive a docker-machine VM and the container engine inside it.
//!
//! Commands for `docker-machine`, `VBoxManage` and `docker` are composed as
//! strings and dispatched with an environment (`DOCKER_HOST`,
//! `DOCKER_CERT_PATH`, `DOCKER_TLS_VERIFY`, `DOCKER_MACHINE_NAME`) that
//! points them at the VM's engine.

pub mod docker;
pub mod logging;
pub mod machine;
pub mod paths;
pub mod settings;
pub mod state_machine;

//! Engine environment for commands aimed at a docker-machine VM.
//!
//! Every command dispatched against a VM runs with the ambient process
//! environment overlaid by four variables that tell the `docker` CLI which
//! remote engine to talk to and how to trust it:
//!
//! ```text
//! DOCKER_HOST          ""  |  <raw ip>  |  tcp://<ip>:2376
//! DOCKER_CERT_PATH     <cert base>/<machine name>
//! DOCKER_TLS_VERIFY    "1"
//! DOCKER_MACHINE_NAME  <machine name>
//! ```

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";
pub const DOCKER_MACHINE_NAME: &str = "DOCKER_MACHINE_NAME";

/// Port the docker daemon inside a docker-machine VM listens on with TLS.
pub const ENGINE_TLS_PORT: u16 = 2376;

/// Where the engine endpoint of a VM currently points.
///
/// The endpoint changes shape during provisioning: nothing is known before
/// the VM exists, the bare address is known right after creation, and the
/// TLS endpoint becomes usable once certificates are regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostEndpoint {
    #[default]
    Unresolved,
    /// Bare VM address as printed by `docker-machine ip`.
    RawAddress(String),
    /// `tcp://<ip>:2376`.
    Tls(String),
}

impl HostEndpoint {
    /// Build the TLS endpoint for a VM address.
    pub fn tls_for(address: &str) -> Self {
        HostEndpoint::Tls(format!("tcp://{address}:{ENGINE_TLS_PORT}"))
    }

    /// The value written to `DOCKER_HOST`.
    pub fn as_env_value(&self) -> &str {
        match self {
            HostEndpoint::Unresolved => "",
            HostEndpoint::RawAddress(addr) => addr,
            HostEndpoint::Tls(url) => url,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, HostEndpoint::Tls(_))
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEndpoint::Unresolved => f.write_str("<unresolved>"),
            other => f.write_str(other.as_env_value()),
        }
    }
}

/// Identity of the VM the environment targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub name: String,
    /// Base directory holding one certificate directory per machine.
    pub cert_base: PathBuf,
    /// Value for `DOCKER_TLS_VERIFY`.
    pub tls_verify: String,
}

impl MachineIdentity {
    pub fn cert_path(&self) -> PathBuf {
        self.cert_base.join(&self.name)
    }
}

/// Ordered variable mapping handed to every dispatched command.
///
/// Has no identity beyond its contents. Callers rebuild it through
/// [`EngineEnv::for_machine`] whenever the host endpoint changes. Keys and
/// values are kept as `OsString` so ambient variables that are not UTF-8
/// pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl EngineEnv {
    /// Overlay the engine variables for `machine` at `endpoint` on top of
    /// the current process environment.
    pub fn for_machine(machine: &MachineIdentity, endpoint: &HostEndpoint) -> Self {
        Self::overlay(std::env::vars_os(), machine, endpoint)
    }

    /// Overlay the engine variables on an explicit base environment.
    pub fn overlay<I, K, V>(base: I, machine: &MachineIdentity, endpoint: &HostEndpoint) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut env: Self = base.into_iter().collect();
        for (key, value) in Self::overrides(machine, endpoint) {
            env.vars.insert(key.into(), value.into());
        }
        env.vars
            .insert(DOCKER_CERT_PATH.into(), machine.cert_path().into_os_string());
        env
    }

    /// The four engine variables, in a fixed order.
    pub fn overrides(machine: &MachineIdentity, endpoint: &HostEndpoint) -> [(&'static str, String); 4] {
        [
            (DOCKER_HOST, endpoint.as_env_value().to_string()),
            (DOCKER_CERT_PATH, path_to_string(&machine.cert_path())),
            (DOCKER_TLS_VERIFY, machine.tls_verify.clone()),
            (DOCKER_MACHINE_NAME, machine.name.clone()),
        ]
    }

    /// Return a copy with extra variables layered on top.
    pub fn with_vars<'a, I>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut merged = self.clone();
        for (key, value) in extra {
            merged.vars.insert(key.into(), value.into());
        }
        merged
    }

    /// Value of `key`, if set and valid UTF-8.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_os(key).and_then(OsStr::to_str)
    }

    pub fn get_os(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for EngineEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

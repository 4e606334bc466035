//! Command-line construction for `docker` and `docker-machine`.
//!
//! Everything here is a pure function from typed parameters to the exact
//! command string handed to a [`Dispatcher`](super::dispatch::Dispatcher).
//! Nothing is validated: names, ports and paths are written verbatim and the
//! external tool is the only layer that rejects malformed input.

use std::collections::BTreeMap;
use std::path::Path;

/// Host folder the VirtualBox driver mounts into every docker-machine VM.
pub const SHARED_FOLDER_ROOT: &str = "/Users";

/// Default `--restart` policy for `docker run`.
pub const DEFAULT_RESTART_POLICY: &str = "no";

// ---------------------------------------------------------------------------
// docker run parameters
// ---------------------------------------------------------------------------

/// One `--volume` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSpec {
    /// Mount the shared folder root at the given guest path.
    Guest(String),
    /// Mount a host path (relative to the shared root unless it already
    /// contains it) at a guest path.
    Bind { host: String, guest: String },
}

impl VolumeSpec {
    /// Parse `GUEST` or `HOST:GUEST`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((host, guest)) => VolumeSpec::Bind {
                host: host.to_string(),
                guest: guest.to_string(),
            },
            None => VolumeSpec::Guest(spec.to_string()),
        }
    }

    fn to_arg(&self, shared_root: &str) -> String {
        match self {
            VolumeSpec::Guest(guest) => format!("--volume {shared_root}:{guest}"),
            VolumeSpec::Bind { host, guest } => {
                format!("--volume {}:{guest}", shared_host_path(shared_root, host))
            }
        }
    }
}

/// A `--mount source=...,destination=...` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub source: String,
    pub destination: String,
}

/// A `-p host:guest` port publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub host: u16,
    pub guest: u16,
}

impl PortMap {
    pub fn new(host: u16, guest: u16) -> Self {
        Self { host, guest }
    }
}

/// Environment variables passed to a container.
///
/// Only the names ever appear on the command line (`-e NAME`). With
/// [`EnvVars::Values`] the values are merged into the dispatched process
/// environment so `docker` picks them up from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvVars {
    Names(Vec<String>),
    Values(BTreeMap<String, String>),
}

impl EnvVars {
    pub fn names(&self) -> Vec<&str> {
        match self {
            EnvVars::Names(names) => names.iter().map(String::as_str).collect(),
            EnvVars::Values(values) => values.keys().map(String::as_str).collect(),
        }
    }

    /// Values to merge into the dispatch environment, if any.
    pub fn values(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            EnvVars::Names(_) => None,
            EnvVars::Values(values) => Some(values),
        }
    }
}

/// Options for `docker run`. Absent options produce no flag at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub volumes: Vec<VolumeSpec>,
    pub mount: Option<MountSpec>,
    pub ports: Vec<PortMap>,
    pub env: Option<EnvVars>,
    pub container_name: Option<String>,
    pub entrypoint: Option<String>,
    pub restart: String,
    pub remove: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            mount: None,
            ports: Vec::new(),
            env: None,
            container_name: None,
            entrypoint: None,
            restart: DEFAULT_RESTART_POLICY.to_string(),
            remove: true,
        }
    }
}

/// Resolve a host path against the shared folder root.
///
/// A path that already contains the root is returned unchanged, anything
/// else is treated as relative to it.
pub fn shared_host_path(shared_root: &str, host: &str) -> String {
    if host.contains(shared_root) {
        host.to_string()
    } else {
        format!("{shared_root}/{host}")
    }
}

// ---------------------------------------------------------------------------
// docker
// ---------------------------------------------------------------------------

pub fn docker_run(image: &str, tag: &str, opts: &RunOptions, shared_root: &str) -> String {
    let mut args: Vec<String> = Vec::new();

    for volume in &opts.volumes {
        args.push(volume.to_arg(shared_root));
    }

    if let Some(mount) = &opts.mount {
        args.push(format!(
            "--mount source={},destination={}",
            mount.source, mount.destination
        ));
    }

    for port in &opts.ports {
        args.push(format!("-p {}:{}", port.host, port.guest));
    }

    args.push(format!("--restart {}", opts.restart));

    if opts.remove {
        args.push("--rm".to_string());
    }

    if let Some(env) = &opts.env {
        for name in env.names() {
            args.push(format!("-e {name}"));
        }
    }

    if let Some(name) = &opts.container_name {
        args.push(format!("--name {name}"));
    }

    if let Some(entrypoint) = &opts.entrypoint {
        args.push(format!("--entrypoint {entrypoint}"));
    }

    format!("docker run {} {image}:{tag}", args.join(" "))
}

pub fn docker_build(image: &str, tag: &str, context: &Path) -> String {
    format!("docker build -t {image}:{tag} {}", context.display())
}

pub fn docker_tag(image: &str, tag: &str, repo: &str, repo_tag: &str) -> String {
    format!("docker tag {image}:{tag} {repo}:{repo_tag}")
}

pub fn docker_push(repo: &str) -> String {
    format!("docker push {repo}")
}

pub fn docker_save(image: &str, file: &Path) -> String {
    format!("docker save -o {} {image}", file.display())
}

pub fn docker_load(file: &Path) -> String {
    format!("docker load -i {}", file.display())
}

pub fn docker_login(username: &str, password: &str) -> String {
    format!("docker login --username={username} --password={password}")
}

pub fn container_start(name: &str) -> String {
    format!("docker start {name}")
}

pub fn container_stop(name: &str) -> String {
    format!("docker stop {name}")
}

pub fn container_remove(name: &str) -> String {
    format!("docker rm {name}")
}

pub fn container_attach(name: &str) -> String {
    format!("docker attach {name}")
}

pub fn container_exec(name: &str, command: &str) -> String {
    format!("docker exec {name} {command}")
}

pub fn container_inspect(name: &str) -> String {
    format!("docker container inspect {name}")
}

pub fn volume_create(name: &str) -> String {
    format!("docker volume create {name}")
}

pub fn volume_remove(name: &str) -> String {
    format!("docker volume rm {name}")
}

pub fn volume_inspect(name: &str) -> String {
    format!("docker volume inspect {name}")
}

/// Force-remove every container, in the launcher interpreter's loop idiom.
#[cfg(windows)]
pub fn remove_all_containers() -> String {
    "FOR /f \"tokens=*\" %%i IN ('docker ps -aq') DO docker rm -f %%i".to_string()
}

#[cfg(not(windows))]
pub fn remove_all_containers() -> String {
    "for id in $(docker ps -aq); do docker rm -f \"$id\"; done".to_string()
}

/// Force-remove every image, in the launcher interpreter's loop idiom.
#[cfg(windows)]
pub fn remove_all_images() -> String {
    "FOR /f \"tokens=*\" %%i IN ('docker images --format \"{{.ID}}\"') DO docker rmi -f %%i"
        .to_string()
}

#[cfg(not(windows))]
pub fn remove_all_images() -> String {
    "for id in $(docker images --format '{{.ID}}'); do docker rmi -f \"$id\"; done".to_string()
}

/// Run a pre-build hook script from inside the build directory.
#[cfg(windows)]
pub fn pre_build_hook(dir: &Path, hook: &str) -> String {
    format!("cd /d \"{}\" && CALL {hook}", dir.display())
}

#[cfg(not(windows))]
pub fn pre_build_hook(dir: &Path, hook: &str) -> String {
    format!("cd \"{}\" && sh {hook}", dir.display())
}

// ---------------------------------------------------------------------------
// aws (registry credentials)
// ---------------------------------------------------------------------------

pub fn sts_session_token(serial_number: &str, token_code: &str, profile: &str) -> String {
    format!(
        "aws sts get-session-token --serial-number {serial_number} --token-code {token_code} \
         --profile {profile}"
    )
}

pub fn aws_configure_set(key: &str, value: &str, profile: &str) -> String {
    format!("aws configure set {key} {value} --profile {profile}")
}

pub fn ecr_get_login(region: &str, profile: &str) -> String {
    format!("aws ecr get-login --no-include-email --region {region} --profile {profile}")
}

// ---------------------------------------------------------------------------
// docker-machine
// ---------------------------------------------------------------------------

pub fn machine_create(driver: &str, memory_mb: u32, disk_size_mb: u32, name: &str) -> String {
    format!(
        "docker-machine create --driver {driver} --virtualbox-memory {memory_mb} \
         --virtualbox-disk-size {disk_size_mb} {name}"
    )
}

pub fn machine_start(name: &str) -> String {
    format!("docker-machine start {name}")
}

pub fn machine_stop(name: &str) -> String {
    format!("docker-machine stop {name}")
}

pub fn machine_remove(name: &str) -> String {
    format!("docker-machine rm -y {name}")
}

pub fn machine_ip(name: &str) -> String {
    format!("docker-machine ip {name}")
}

pub fn machine_status(name: &str) -> String {
    format!("docker-machine status {name}")
}

pub fn machine_regenerate_certs(name: &str) -> String {
    format!("docker-machine regenerate-certs -f {name}")
}

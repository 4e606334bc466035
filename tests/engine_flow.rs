//! End-to-end flows through `DockerMachine` and `Docker` with a recording
//! dispatcher in place of real processes.
//!
//! Every dispatched command is logged together with the environment it ran
//! under, so the tests can check both the command order and which
//! `DOCKER_HOST` each step saw. Capture-mode commands are answered from a
//! small table of canned responses keyed by command prefix.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dockhand::docker::{DEFAULT_BUILD_HOOK, Presence};
use dockhand::machine::command::{EnvVars, RunOptions};
use dockhand::machine::env::DOCKER_HOST;
use dockhand::machine::{
    DispatchError, Dispatcher, DockerMachine, EngineEnv, HostEndpoint, MachineIdentity, MachineStatus,
    ProvisionOptions, VirtualBoxDriver,
};
use dockhand::state_machine::machine_sm::{MachineLifecycle, State};

// ---------------------------------------------------------------------------
// Recording dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Call,
    Capture,
}

#[derive(Debug, Clone)]
struct Dispatched {
    mode: Mode,
    command: String,
    env: EngineEnv,
}

impl Dispatched {
    fn host(&self) -> &str {
        self.env.get(DOCKER_HOST).unwrap_or_default()
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    log: Mutex<Vec<Dispatched>>,
    /// Command prefix -> captured stdout (`Ok`) or stderr of a failed run (`Err`).
    responses: Mutex<Vec<(String, Result<String, String>)>>,
}

impl RecordingDispatcher {
    fn respond(&self, prefix: &str, stdout: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), Ok(stdout.to_string())));
        self
    }

    fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), Err(stderr.to_string())));
        self
    }

    fn log(&self) -> Vec<Dispatched> {
        self.log.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.log().into_iter().map(|d| d.command).collect()
    }

    fn record(&self, mode: Mode, env: &EngineEnv, command: &str) {
        self.log.lock().unwrap().push(Dispatched {
            mode,
            command: command.to_string(),
            env: env.clone(),
        });
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn call(&self, env: &EngineEnv, command: &str) -> Result<(), DispatchError> {
        self.record(Mode::Call, env, command);
        Ok(())
    }

    async fn capture(&self, env: &EngineEnv, command: &str) -> Result<String, DispatchError> {
        self.record(Mode::Capture, env, command);

        let responses = self.responses.lock().unwrap();
        match responses.iter().find(|(prefix, _)| command.starts_with(prefix.as_str())) {
            Some((_, Ok(stdout))) => Ok(stdout.clone()),
            Some((_, Err(stderr))) => Err(DispatchError::Failed {
                command: command.to_string(),
                code: Some(1),
                stderr: stderr.clone(),
            }),
            None => Ok(String::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const IP: &str = "192.168.99.100";
const TLS_HOST: &str = "tcp://192.168.99.100:2376";

fn identity() -> MachineIdentity {
    MachineIdentity {
        name: "dev".into(),
        cert_base: PathBuf::from("/certs"),
        tls_verify: "1".into(),
    }
}

fn machine(dispatcher: &Arc<RecordingDispatcher>) -> DockerMachine {
    DockerMachine::new(
        identity(),
        VirtualBoxDriver::new(Some(PathBuf::from("/opt/vbox"))),
        dispatcher.clone(),
    )
}

/// A dispatcher answering for a running VM at [`IP`].
fn running_vm() -> Arc<RecordingDispatcher> {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher
        .respond("docker-machine status", "Running")
        .respond("docker-machine ip", IP);
    dispatcher
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provision_creates_missing_machine_with_shared_folder() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher
        .fail("docker-machine status", "Host does not exist: \"dev\"")
        .respond("docker-machine ip", IP);

    let tmp = tempfile::tempdir().unwrap();
    let share = tmp.path().join("share");

    let mut vm = machine(&dispatcher);
    let endpoint = vm
        .provision(&ProvisionOptions {
            shared_folder: Some(share.clone()),
            ..ProvisionOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(endpoint, HostEndpoint::tls_for(IP));
    assert!(MachineLifecycle::is_tls_ready(vm.lifecycle_state()));
    assert!(share.is_dir(), "shared folder should be created locally");

    let log = dispatcher.log();
    let steps: Vec<(Mode, &str, &str)> = log
        .iter()
        .map(|d| (d.mode, d.command.as_str(), d.host()))
        .collect();

    assert_eq!(steps.len(), 9, "unexpected sequence: {steps:#?}");
    assert_eq!(steps[0], (Mode::Capture, "docker-machine status dev", ""));
    assert_eq!(
        steps[1],
        (
            Mode::Call,
            "docker-machine create --driver virtualbox --virtualbox-memory 1024 \
             --virtualbox-disk-size 100000 dev",
            ""
        )
    );
    assert_eq!(steps[2], (Mode::Capture, "docker-machine ip dev", ""));
    assert_eq!(steps[3], (Mode::Call, "docker-machine stop dev", IP));
    assert!(steps[4].1.contains("sharedfolder add dev -name Users"));
    assert_eq!(steps[4].2, IP);
    assert!(steps[5].1.contains("SharedFoldersEnableSymlinksCreate/Users 1"));
    assert_eq!(steps[6], (Mode::Call, "docker-machine start dev", IP));
    assert_eq!(steps[7], (Mode::Capture, "docker-machine ip dev", IP));
    assert_eq!(
        steps[8],
        (Mode::Call, "docker-machine regenerate-certs -f dev", TLS_HOST)
    );
}

#[tokio::test]
async fn provision_without_shared_folder_skips_virtualbox() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher
        .fail("docker-machine status", "Host does not exist: \"dev\"")
        .respond("docker-machine ip", IP);

    let mut vm = machine(&dispatcher);
    vm.provision(&ProvisionOptions::default()).await.unwrap();

    let commands = dispatcher.commands();
    assert!(commands.iter().all(|c| !c.contains("vboxmanage")));
    assert!(commands.iter().all(|c| c != "docker-machine stop dev"));
    assert_eq!(commands.last().map(String::as_str), Some("docker-machine regenerate-certs -f dev"));
}

#[tokio::test]
async fn provision_reuses_running_machine() {
    let dispatcher = running_vm();

    let mut vm = machine(&dispatcher);
    let endpoint = vm.provision(&ProvisionOptions::default()).await.unwrap();

    assert_eq!(endpoint.as_env_value(), TLS_HOST);
    assert_eq!(
        dispatcher.commands(),
        vec![
            "docker-machine status dev",
            "docker-machine regenerate-certs -f dev",
            "docker-machine ip dev",
        ]
    );
    assert!(matches!(
        vm.lifecycle_state(),
        State::TlsReady { endpoint } if *endpoint == HostEndpoint::tls_for(IP)
    ));
}

#[tokio::test]
async fn provision_starts_stopped_machine_first() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher
        .respond("docker-machine status", "Stopped")
        .respond("docker-machine ip", IP);

    let mut vm = machine(&dispatcher);
    vm.provision(&ProvisionOptions::default()).await.unwrap();

    assert_eq!(
        dispatcher.commands(),
        vec![
            "docker-machine status dev",
            "docker-machine start dev",
            "docker-machine regenerate-certs -f dev",
            "docker-machine ip dev",
        ]
    );
    assert!(MachineLifecycle::is_tls_ready(vm.lifecycle_state()));
}

#[tokio::test]
async fn provision_refuses_when_status_is_unknown() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher.fail("docker-machine status", "VBoxManage: command not found");

    let mut vm = machine(&dispatcher);
    let err = vm.provision(&ProvisionOptions::default()).await.unwrap_err();

    assert!(err.to_string().contains("status unknown"), "{err}");
    assert_eq!(dispatcher.commands(), vec!["docker-machine status dev"]);
}

#[tokio::test]
async fn every_command_carries_machine_identity() {
    let dispatcher = running_vm();

    let mut vm = machine(&dispatcher);
    vm.provision(&ProvisionOptions::default()).await.unwrap();

    let cert_path = PathBuf::from("/certs").join("dev").to_string_lossy().into_owned();
    for step in dispatcher.log() {
        assert_eq!(step.env.get("DOCKER_MACHINE_NAME"), Some("dev"));
        assert_eq!(step.env.get("DOCKER_TLS_VERIFY"), Some("1"));
        assert_eq!(step.env.get("DOCKER_CERT_PATH"), Some(cert_path.as_str()));
    }
}

#[tokio::test]
async fn status_and_teardown() {
    let dispatcher = running_vm();

    let mut vm = machine(&dispatcher);
    assert_eq!(vm.status().await, MachineStatus::Running);
    assert!(vm.exists().await.unwrap());

    vm.teardown().await.unwrap();
    assert!(matches!(vm.lifecycle_state(), State::Absent {}));
    assert_eq!(MachineLifecycle::endpoint(vm.lifecycle_state()), HostEndpoint::Unresolved);
    assert_eq!(
        dispatcher.commands().last().map(String::as_str),
        Some("docker-machine rm -y dev")
    );
}

// ---------------------------------------------------------------------------
// Engine client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn docker_client_connects_to_tls_endpoint() {
    let dispatcher = running_vm();

    let mut vm = machine(&dispatcher);
    let docker = vm.docker_client().await.unwrap();

    assert_eq!(docker.env().get(DOCKER_HOST), Some(TLS_HOST));
    assert!(format!("{docker:?}").contains(TLS_HOST));
}

#[tokio::test]
async fn docker_client_requires_running_machine() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher.respond("docker-machine status", "Stopped");

    let mut vm = machine(&dispatcher);
    let err = vm.docker_client().await.unwrap_err();
    assert!(err.to_string().contains("not running"), "{err}");
}

#[tokio::test]
async fn docker_client_requires_an_address() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher
        .respond("docker-machine status", "Running")
        .fail("docker-machine ip", "Error getting IP address: host is not running");

    let mut vm = machine(&dispatcher);
    let err = vm.docker_client().await.unwrap_err();
    assert!(err.to_string().contains("no engine endpoint"), "{err}");
}

#[tokio::test]
async fn run_merges_env_values_into_dispatch_environment() {
    let dispatcher = running_vm();
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let opts = RunOptions {
        env: Some(EnvVars::Values(BTreeMap::from([(
            "API_TOKEN".to_string(),
            "s3cret".to_string(),
        )]))),
        container_name: Some("api".into()),
        ..RunOptions::default()
    };
    let container = docker.image("web", "1.0").run(&opts).await.unwrap();
    assert_eq!(container.name(), Some("api"));

    let log = dispatcher.log();
    let run = log.last().unwrap();
    assert_eq!(run.mode, Mode::Call);
    assert!(run.command.starts_with("docker run "));
    assert!(run.command.ends_with(" web:1.0"));
    assert!(run.command.contains("-e API_TOKEN"));
    assert!(!run.command.contains("s3cret"));
    assert_eq!(run.env.get("API_TOKEN"), Some("s3cret"));
    assert_eq!(run.host(), TLS_HOST);
}

#[tokio::test]
async fn container_commands_by_name() {
    let dispatcher = running_vm();
    dispatcher.fail("docker container inspect gone", "Error: No such container: gone");
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let api = docker.container("api");
    api.start().await.unwrap().exec("ls /").await.unwrap();
    api.stop().await.unwrap().remove().await.unwrap();

    let commands = dispatcher.commands();
    let tail = &commands[commands.len() - 4..];
    assert_eq!(
        tail,
        ["docker start api", "docker exec api ls /", "docker stop api", "docker rm api"]
    );

    assert_eq!(api.exists().await.unwrap(), Presence::Present);
    assert_eq!(docker.container("gone").exists().await.unwrap(), Presence::Absent);
}

#[tokio::test]
async fn unnamed_container_cannot_be_controlled() {
    let dispatcher = running_vm();
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let container = docker.image("web", "latest").container(None);
    assert!(container.stop().await.is_err());
}

#[tokio::test]
async fn build_runs_hook_and_bumps_version() {
    let dispatcher = running_vm();
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(DEFAULT_BUILD_HOOK), "echo prepared\n").unwrap();
    std::fs::write(tmp.path().join(".version"), "1.2.3\n").unwrap();

    docker.build("web", "latest", tmp.path()).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(tmp.path().join(".version")).unwrap(),
        "1.2.4\n"
    );

    let log = dispatcher.log();
    let n = log.len();
    assert_eq!(log[n - 2].mode, Mode::Capture);
    assert!(log[n - 2].command.contains(DEFAULT_BUILD_HOOK));
    assert_eq!(log[n - 1].mode, Mode::Call);
    assert_eq!(
        log[n - 1].command,
        format!("docker build -t web:latest {}", tmp.path().display())
    );
}

#[tokio::test]
async fn build_without_hook_or_version_file() {
    let dispatcher = running_vm();
    let docker = machine(&dispatcher).docker_client().await.unwrap();
    let before = dispatcher.log().len();

    let tmp = tempfile::tempdir().unwrap();
    docker.build("web", "dev", tmp.path()).await.unwrap();

    let commands = dispatcher.commands();
    assert_eq!(commands.len(), before + 1);
    assert!(commands[before].starts_with("docker build -t web:dev "));
}

#[tokio::test]
async fn volume_inspect_failure_yields_empty_list() {
    let dispatcher = running_vm();
    dispatcher.fail("docker volume inspect cache", "Error: No such volume: cache");
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let volume = docker.volume("cache");
    assert!(volume.inspect().await.is_empty());
    assert_eq!(volume.exists().await, Presence::Absent);
}

#[tokio::test]
async fn volume_presence_distinguishes_daemon_errors() {
    let dispatcher = running_vm();
    dispatcher
        .fail("docker volume inspect broken", "Cannot connect to the Docker daemon")
        .respond(
            "docker volume inspect data",
            r#"[{"Name": "data", "Driver": "local", "Mountpoint": "/var/lib/docker/volumes/data/_data", "Scope": "local"}]"#,
        );
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    assert!(matches!(docker.volume("broken").exists().await, Presence::Unknown(_)));
    assert_eq!(docker.volume("data").exists().await, Presence::Present);

    let info = docker.volume("data").inspect().await;
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].driver, "local");
}

#[tokio::test]
async fn aws_session_stores_three_credentials() {
    let dispatcher = running_vm();
    dispatcher.respond(
        "aws sts get-session-token",
        r#"{"Credentials": {"AccessKeyId": "AKIA", "SecretAccessKey": "secret", "SessionToken": "token", "Expiration": "2026-10-16T00:00:00Z"}}"#,
    );
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    let credentials = docker
        .aws_session("arn:aws:iam::1:mfa/ci", "123456", "normal", "mfa")
        .await
        .unwrap();
    assert_eq!(credentials.access_key_id, "AKIA");

    let commands = dispatcher.commands();
    let configured: Vec<&String> = commands
        .iter()
        .filter(|c| c.starts_with("aws configure set"))
        .collect();
    assert_eq!(
        configured,
        [
            "aws configure set aws_access_key_id AKIA --profile mfa",
            "aws configure set aws_secret_access_key secret --profile mfa",
            "aws configure set aws_session_token token --profile mfa",
        ]
    );
}

#[tokio::test]
async fn ecr_login_runs_printed_command() {
    let dispatcher = running_vm();
    dispatcher.respond(
        "aws ecr get-login",
        "docker login -u AWS -p token https://1.dkr.ecr.eu-west-1.amazonaws.com",
    );
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    docker.ecr_login("eu-west-1", "mfa").await.unwrap();

    let log = dispatcher.log();
    let last = log.last().unwrap();
    assert_eq!(last.mode, Mode::Call);
    assert!(last.command.starts_with("docker login -u AWS"));
}

#[tokio::test]
async fn cleanup_removes_containers_before_images() {
    let dispatcher = running_vm();
    let docker = machine(&dispatcher).docker_client().await.unwrap();

    docker.cleanup().await.unwrap();

    let commands = dispatcher.commands();
    let n = commands.len();
    assert!(commands[n - 2].contains("docker ps -aq"));
    assert!(commands[n - 1].contains("docker images"));
}

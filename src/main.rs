//! dockhand: provision a docker-machine VM and drive containers on it.
//!
//! Every subcommand that talks to the container engine resolves the VM's
//! TLS endpoint first, so `dockhand provision` must have run once.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Instrument, info_span, warn};

use dockhand::docker::image::DEFAULT_TAG;
use dockhand::docker::registry::{DEFAULT_MFA_PROFILE, DEFAULT_PROFILE, DEFAULT_REGION};
use dockhand::docker::{Docker, Presence};
use dockhand::machine::command::{DEFAULT_RESTART_POLICY, EnvVars, MountSpec, PortMap, RunOptions, VolumeSpec};
use dockhand::machine::dispatch::{LAUNCHER_FILE_NAME, dispatcher_for};
use dockhand::machine::{
    DispatchMode, DockerMachine, MachineIdentity, MachineStatus, ProvisionOptions, VirtualBoxDriver,
};
use dockhand::paths::{DockhandPaths, default_cert_base};
use dockhand::settings::Settings;
use dockhand::logging;

/// Provision a docker-machine VM and drive containers on it
#[derive(Parser, Debug)]
#[command(name = "dockhand", version, about = "Provision a docker-machine VM and drive containers on it")]
struct Args {
    /// docker-machine VM name (overrides the settings file)
    #[arg(short, long, global = true)]
    machine: Option<String>,

    /// Settings file (default: ~/.config/dockhand/dockhand.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// How commands are handed to the shell
    #[arg(long, value_enum, global = true)]
    dispatch: Option<DispatchMode>,

    /// Log progress to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create or reuse the VM and make its engine endpoint TLS-ready
    Provision {
        /// Host folder to share into a newly created VM
        #[arg(long)]
        shared_folder: Option<PathBuf>,

        /// Do not allow symlinks inside the shared folder
        #[arg(long)]
        no_symlinks: bool,

        /// VM memory in MB
        #[arg(long)]
        memory: Option<u32>,

        /// VM disk size in MB
        #[arg(long)]
        disk_size: Option<u32>,
    },

    /// Delete the VM
    Teardown,

    /// Print the VM status
    Status,

    /// Print the engine environment as shell exports
    Env,

    #[command(flatten)]
    Engine(EngineCmd),
}

#[derive(Subcommand, Debug)]
enum EngineCmd {
    /// Build an image from a directory
    Build {
        image: String,
        #[arg(short, long, default_value = DEFAULT_TAG)]
        tag: String,
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Run a container
    Run(RunArgs),

    /// Tag an image into a repository
    Tag {
        image: String,
        repo: String,
        #[arg(long, default_value = DEFAULT_TAG)]
        tag: String,
        #[arg(long, default_value = DEFAULT_TAG)]
        repo_tag: String,
    },

    /// Push a repository
    Push { repo: String },

    /// Save an image to a tar archive
    Save {
        image: String,
        output: PathBuf,
    },

    /// Load an image from a tar archive
    Load {
        file: PathBuf,
        image: String,
        #[arg(long, default_value = DEFAULT_TAG)]
        tag: String,
    },

    /// Manage a named container
    #[command(subcommand)]
    Container(ContainerCmd),

    /// Manage a named volume
    #[command(subcommand)]
    Volume(VolumeCmd),

    /// Force-remove all containers and images
    Cleanup,

    /// Log the engine in to a registry
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Exchange an MFA code for AWS session credentials
    AwsSession {
        #[arg(long)]
        serial_number: String,
        #[arg(long)]
        token_code: String,
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
        #[arg(long, default_value = DEFAULT_MFA_PROFILE)]
        mfa_profile: String,
    },

    /// Log the engine in to ECR
    EcrLogin {
        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,
        #[arg(long, default_value = DEFAULT_MFA_PROFILE)]
        profile: String,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    image: String,

    #[arg(short, long, default_value = DEFAULT_TAG)]
    tag: String,

    /// GUEST or HOST:GUEST; host paths resolve against the shared folder root
    #[arg(short = 'v', long = "volume")]
    volumes: Vec<String>,

    /// SOURCE:DESTINATION
    #[arg(long, value_parser = parse_mount)]
    mount: Option<MountSpec>,

    /// HOST:GUEST
    #[arg(short = 'p', long = "publish", value_parser = parse_port_map)]
    ports: Vec<PortMap>,

    /// NAME to pass through, or NAME=VALUE
    #[arg(short = 'e', long = "env")]
    env: Vec<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    entrypoint: Option<String>,

    #[arg(long, default_value = DEFAULT_RESTART_POLICY)]
    restart: String,

    /// Keep the container after it exits
    #[arg(long)]
    keep: bool,
}

#[derive(Subcommand, Debug)]
enum ContainerCmd {
    Start { name: String },
    Stop { name: String },
    Rm { name: String },
    Attach { name: String },
    /// Run a command in the container
    Exec {
        name: String,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    Exists { name: String },
}

#[derive(Subcommand, Debug)]
enum VolumeCmd {
    Create { name: String },
    Rm { name: String },
    Inspect { name: String },
    Exists { name: String },
}

// ---------------------------------------------------------------------------
// Argument parsing helpers
// ---------------------------------------------------------------------------

fn parse_port_map(s: &str) -> Result<PortMap, String> {
    let (host, guest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HOST:GUEST, got {s:?}"))?;
    let port = |p: &str| p.parse::<u16>().map_err(|e| format!("port {p:?}: {e}"));
    Ok(PortMap::new(port(host)?, port(guest)?))
}

fn parse_mount(s: &str) -> Result<MountSpec, String> {
    let (source, destination) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SOURCE:DESTINATION, got {s:?}"))?;
    Ok(MountSpec {
        source: source.to_string(),
        destination: destination.to_string(),
    })
}

/// `-e` flags are either all bare names or all `NAME=VALUE` pairs.
fn parse_env(entries: &[String]) -> Result<Option<EnvVars>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let pairs: Vec<Option<(&str, &str)>> = entries.iter().map(|e| e.split_once('=')).collect();
    if pairs.iter().all(Option::is_none) {
        return Ok(Some(EnvVars::Names(entries.to_vec())));
    }
    if pairs.iter().any(Option::is_none) {
        bail!("-e flags must be either all NAME or all NAME=VALUE");
    }

    let values: BTreeMap<String, String> = pairs
        .into_iter()
        .flatten()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(Some(EnvVars::Values(values)))
}

impl RunArgs {
    fn to_options(&self) -> Result<RunOptions> {
        Ok(RunOptions {
            volumes: self.volumes.iter().map(|v| VolumeSpec::parse(v)).collect(),
            mount: self.mount.clone(),
            ports: self.ports.clone(),
            env: parse_env(&self.env)?,
            container_name: self.name.clone(),
            entrypoint: self.entrypoint.clone(),
            restart: self.restart.clone(),
            remove: !self.keep,
        })
    }
}

#[cfg(windows)]
fn export_line(key: &str, value: &str) -> String {
    format!("SET {key}={value}")
}

#[cfg(not(windows))]
fn export_line(key: &str, value: &str) -> String {
    format!("export {key}=\"{value}\"")
}

fn describe_presence(presence: &Presence) -> String {
    match presence {
        Presence::Present => "present".to_string(),
        Presence::Absent => "absent".to_string(),
        Presence::Unknown(reason) => format!("unknown ({reason})"),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn build_machine(settings: &Settings, paths: Option<&DockhandPaths>) -> Result<DockerMachine> {
    let cert_base = settings
        .cert_path
        .clone()
        .or_else(default_cert_base)
        .context("cannot resolve the home directory; set cert_path in the settings file")?;

    let script_path = settings
        .script_path
        .clone()
        .or_else(|| paths.map(DockhandPaths::launcher_script))
        .unwrap_or_else(|| std::env::temp_dir().join(LAUNCHER_FILE_NAME));

    let identity = MachineIdentity {
        name: settings.machine_name.clone(),
        cert_base,
        tls_verify: settings.tls_verify.clone(),
    };

    Ok(DockerMachine::new(
        identity,
        VirtualBoxDriver::new(settings.virtualbox_path.clone()),
        dispatcher_for(settings.dispatch, script_path),
    )
    .with_shared_folder_root(settings.shared_folder_root.clone())
    .with_build_files(settings.build_files()))
}

async fn execute(cmd: Cmd, settings: &Settings, mut machine: DockerMachine) -> Result<()> {
    match cmd {
        Cmd::Provision {
            shared_folder,
            no_symlinks,
            memory,
            disk_size,
        } => {
            let opts = ProvisionOptions {
                shared_folder,
                symlinks: !no_symlinks,
                memory_mb: memory.unwrap_or(settings.memory_mb),
                disk_size_mb: disk_size.unwrap_or(settings.disk_size_mb),
            };
            let endpoint = machine.provision(&opts).await?;
            println!("HOST: {endpoint}");
        }
        Cmd::Teardown => machine.teardown().await?,
        Cmd::Status => match machine.status().await {
            MachineStatus::Running => println!("Running"),
            MachineStatus::Stopped => println!("Stopped"),
            MachineStatus::Other(state) => println!("{state}"),
            MachineStatus::Absent => println!("does not exist"),
            MachineStatus::Unknown(reason) => println!("unknown ({reason})"),
        },
        Cmd::Env => {
            machine.connect().await?;
            for (key, value) in machine.env_overrides() {
                println!("{}", export_line(key, &value));
            }
        }
        Cmd::Engine(engine) => {
            let docker = machine.docker_client().await?;
            execute_engine(engine, &docker).await?;
        }
    }
    Ok(())
}

async fn execute_engine(cmd: EngineCmd, docker: &Docker) -> Result<()> {
    match cmd {
        EngineCmd::Build { image, tag, dir } => {
            docker.build(&image, &tag, &dir).await?;
        }
        EngineCmd::Run(args) => {
            let opts = args.to_options()?;
            docker.image(&args.image, &args.tag).run(&opts).await?;
        }
        EngineCmd::Tag {
            image,
            repo,
            tag,
            repo_tag,
        } => docker.image(image, tag).tag(&repo, &repo_tag).await?,
        EngineCmd::Push { repo } => docker.image(&repo, DEFAULT_TAG).push(&repo).await?,
        EngineCmd::Save { image, output } => docker.image(image, DEFAULT_TAG).save(&output).await?,
        EngineCmd::Load { file, image, tag } => {
            docker.load(&file, &image, &tag).await?;
        }
        EngineCmd::Container(action) => {
            let container = |name: String| docker.container(name);
            match action {
                ContainerCmd::Start { name } => {
                    container(name).start().await?;
                }
                ContainerCmd::Stop { name } => {
                    container(name).stop().await?;
                }
                ContainerCmd::Rm { name } => {
                    container(name).remove().await?;
                }
                ContainerCmd::Attach { name } => {
                    container(name).attach().await?;
                }
                ContainerCmd::Exec { name, command } => {
                    container(name).exec(&command.join(" ")).await?;
                }
                ContainerCmd::Exists { name } => {
                    println!("{}", describe_presence(&container(name).exists().await?));
                }
            }
        }
        EngineCmd::Volume(action) => match action {
            VolumeCmd::Create { name } => {
                docker.volume(name).create().await?;
            }
            VolumeCmd::Rm { name } => docker.volume(name).remove().await?,
            VolumeCmd::Inspect { name } => {
                let volumes = docker.volume(name).inspect().await;
                println!("{}", serde_json::to_string_pretty(&volumes)?);
            }
            VolumeCmd::Exists { name } => {
                println!("{}", describe_presence(&docker.volume(name).exists().await));
            }
        },
        EngineCmd::Cleanup => docker.cleanup().await?,
        EngineCmd::Login { username, password } => docker.login(&username, &password).await?,
        EngineCmd::AwsSession {
            serial_number,
            token_code,
            profile,
            mfa_profile,
        } => {
            docker
                .aws_session(&serial_number, &token_code, &profile, &mfa_profile)
                .await?;
        }
        EngineCmd::EcrLogin { region, profile } => docker.ecr_login(&region, &profile).await?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let Args {
        machine,
        config,
        dispatch,
        verbose,
        command,
    } = Args::parse();

    let paths = DockhandPaths::resolve();
    let _log_guard = logging::init(paths.as_ref().map(|p| p.logs.clone()), verbose);

    if let Some(paths) = &paths {
        if let Err(e) = paths.ensure() {
            warn!(error = %e, "could not create application directories");
        }
    }

    let settings_path = config.or_else(|| paths.as_ref().map(DockhandPaths::settings_file));
    let mut settings = match &settings_path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(machine) = machine {
        settings.machine_name = machine;
    }
    if let Some(dispatch) = dispatch {
        settings.dispatch = dispatch;
    }

    let machine = build_machine(&settings, paths.as_ref())?;

    // Commands run strictly one after another; a single-threaded runtime
    // is all that is needed.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;

    let span = info_span!("dockhand", machine = %settings.machine_name);
    runtime.block_on(execute(command, &settings, machine).instrument(span))
}

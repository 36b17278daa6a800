use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use remote_provision_core::{
    BinarySource, InstallTarget, Platform, ProvisionError, RemoteProvisioner, SessionError,
    SshAuth, SshExecutor,
};
use tracing_subscriber::EnvFilter;

const PASSWORD_ENV: &str = "REMOTE_PROVISION_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "remote-provision")]
#[command(about = "Provision agent binaries on remote hosts over SSH", long_about = None)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Remote host, as `host` or `host:port` (defaults to port 22).
    #[arg(long)]
    host: String,
    /// SSH user to authenticate as.
    #[arg(long)]
    user: String,
    /// Private key file; when absent, password auth is read from
    /// REMOTE_PROVISION_PASSWORD.
    #[arg(long)]
    identity: Option<PathBuf>,
    /// Passphrase for the private key file, if it has one.
    #[arg(long)]
    passphrase: Option<String>,
    /// Name of the agent binary to probe and install.
    #[arg(long)]
    agent: String,
    /// JSON file mapping platforms ("linux-amd64", "linux-arm64") to binary
    /// archive URLs.
    #[arg(long)]
    urls: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Detect the remote platform.
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Report whether the agent binary and its service unit exist.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Install the agent binary, overwriting any existing one.
    Install {
        /// Skip detection and install for this platform.
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Detect, install if absent, and report the final state.
    Provision {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, serde::Serialize)]
struct StatusReport {
    platform: Platform,
    agent_installed: bool,
    daemon_registered: bool,
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let provisioner = build_provisioner(&cli.target)?;

    match cli.command {
        Commands::Detect { json } => {
            let platform = provisioner.detect()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&platform)?);
            } else {
                println!("{platform}");
            }
        }
        Commands::Status { json } => {
            let platform = provisioner.detect()?;
            let report = StatusReport {
                platform,
                agent_installed: provisioner.agent_installed(platform)?,
                daemon_registered: provisioner.daemon_registered(platform)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Platform: {}", report.platform);
                println!("Agent installed: {}", report.agent_installed);
                println!("Daemon registered: {}", report.daemon_registered);
            }
        }
        Commands::Install { platform } => {
            let platform = match platform {
                Some(platform) => platform,
                None => provisioner.detect()?,
            };
            provisioner.install(platform)?;
            println!(
                "Installed {} for {platform}",
                provisioner.target().install_path()
            );
        }
        Commands::Provision { json } => {
            let report = provisioner.provision()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Platform: {}", report.platform);
                if report.installed_now {
                    println!("Agent installed to {}", provisioner.target().install_path());
                } else {
                    println!("Agent already installed, skipped");
                }
                println!("Daemon registered: {}", report.daemon_registered);
            }
        }
    }

    Ok(())
}

fn build_provisioner(target: &TargetArgs) -> Result<RemoteProvisioner<SshExecutor>, CliError> {
    let source = match &target.urls {
        Some(path) => load_binary_source(path)?,
        None => BinarySource::default(),
    };

    let auth = resolve_auth(target)?;
    let addr = if target.host.contains(':') {
        target.host.clone()
    } else {
        format!("{}:22", target.host)
    };

    let executor = SshExecutor::connect(&addr, &target.user, &auth)?;
    Ok(RemoteProvisioner::new(
        executor,
        source,
        InstallTarget::new(&target.agent),
    ))
}

fn resolve_auth(target: &TargetArgs) -> Result<SshAuth, CliError> {
    if let Some(path) = &target.identity {
        return Ok(SshAuth::KeyFile {
            path: path.clone(),
            passphrase: target.passphrase.clone(),
        });
    }
    match std::env::var(PASSWORD_ENV) {
        Ok(password) => Ok(SshAuth::Password(password)),
        Err(_) => Err(CliError::MissingAuth),
    }
}

fn load_binary_source(path: &PathBuf) -> Result<BinarySource, CliError> {
    let mut file = File::open(path)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    let source = serde_json::from_str(&buffer)?;
    Ok(source)
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("no authentication configured: pass --identity or set {PASSWORD_ENV}")]
    MissingAuth,
}

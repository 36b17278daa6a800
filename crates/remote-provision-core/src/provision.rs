use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::executor::{ExecError, RemoteExecutor, Session, SessionError};
use crate::types::{BinarySource, InstallTarget, Platform};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("remote command failed: {0}")]
    Command(#[from] ExecError),
    #[error("unexpected `uname -a` output: got {fields} fields")]
    Parse { fields: usize },
    #[error("unsupported cpu architecture: {0}")]
    UnsupportedPlatform(String),
    #[error("no binary url configured for {0}")]
    UnknownPlatformUrl(Platform),
}

/// Outcome of a full [`RemoteProvisioner::provision`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub platform: Platform,
    pub agent_was_installed: bool,
    pub installed_now: bool,
    pub daemon_registered: bool,
}

const UNAME_ARCH_FIELD: usize = 12;
const UNAME_MIN_FIELDS: usize = UNAME_ARCH_FIELD + 1;

/// Map `uname -a` output to a supported [`Platform`].
///
/// The architecture token is read from the 13th whitespace-separated field,
/// where the conventional multi-field `uname -a` layout places it. Positional
/// parsing is fragile by design: the provisioner targets a narrow, known set
/// of platforms, not general OS fingerprinting.
pub fn platform_from_uname(output: &[u8]) -> Result<Platform, ProvisionError> {
    let text = String::from_utf8_lossy(output);
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() < UNAME_MIN_FIELDS {
        return Err(ProvisionError::Parse {
            fields: fields.len(),
        });
    }

    match fields[UNAME_ARCH_FIELD] {
        "x86_64" => Ok(Platform::LinuxAmd64),
        "arm64" => Ok(Platform::LinuxArm64),
        other => Err(ProvisionError::UnsupportedPlatform(other.to_string())),
    }
}

/// Drives the detect / probe / install protocol against one remote host.
///
/// Stateless between calls: every operation opens its own session, runs its
/// commands, and releases the session before returning. Failures are terminal
/// for the operation that raised them; retry policy belongs to the caller.
pub struct RemoteProvisioner<E> {
    executor: E,
    source: BinarySource,
    target: InstallTarget,
}

impl<E: RemoteExecutor> RemoteProvisioner<E> {
    pub fn new(executor: E, source: BinarySource, target: InstallTarget) -> Self {
        Self {
            executor,
            source,
            target,
        }
    }

    pub fn target(&self) -> &InstallTarget {
        &self.target
    }

    /// Detect the remote platform from `uname -a` output.
    pub fn detect(&self) -> Result<Platform, ProvisionError> {
        self.with_session(|session| {
            let output = session.run("uname -a")?;
            platform_from_uname(&output)
        })
    }

    /// Whether the agent binary already exists at its install path.
    ///
    /// A nonzero exit from the existence check is the "not installed" signal,
    /// not an error; only transport and session failures propagate.
    pub fn agent_installed(&self, platform: Platform) -> Result<bool, ProvisionError> {
        let command = match platform {
            // Both supported platforms are Linux and share the probe command.
            Platform::LinuxAmd64 | Platform::LinuxArm64 => {
                format!("test -f {}", self.target.install_path())
            }
        };

        self.with_session(|session| match session.run(&command) {
            Ok(_) => Ok(true),
            Err(err) if err.is_exit_status() => Ok(false),
            Err(err) => Err(err.into()),
        })
    }

    /// Whether a service unit for the agent shows up in the remote service
    /// manager listing.
    ///
    /// Unlike [`agent_installed`](Self::agent_installed), a failing command is
    /// reported as an error here, not as "not registered" — empty output on a
    /// successful command is the only negative signal.
    pub fn daemon_registered(&self, platform: Platform) -> Result<bool, ProvisionError> {
        let command = match platform {
            Platform::LinuxAmd64 | Platform::LinuxArm64 => format!(
                "systemctl list-units --type=service | grep {}",
                self.target.name()
            ),
        };

        self.with_session(|session| {
            let output = session.run(&command)?;
            Ok(!output.is_empty())
        })
    }

    /// Download, extract and install the agent binary for `platform`.
    ///
    /// Does not probe pre-existing state; re-running against an installed
    /// agent overwrites it. A partially-downloaded archive may remain on the
    /// host when the composite command fails midway.
    pub fn install(&self, platform: Platform) -> Result<(), ProvisionError> {
        let url = self
            .source
            .url_for(platform)
            .ok_or(ProvisionError::UnknownPlatformUrl(platform))?;

        let fetch = format!(
            "curl -o {archive} {url} | tar -xz -C {staging} -f {archive} && mv {staged} {install_dir}",
            archive = self.target.archive_path(),
            staging = self.target.staging_dir(),
            staged = self.target.staged_path(),
            install_dir = self.target.install_dir(),
        );
        let chmod = format!("chmod +x {}", self.target.install_path());

        debug!(platform = %platform, url, "installing agent binary");
        self.with_session(|session| {
            session.run(&fetch)?;
            session.run(&chmod)?;
            Ok(())
        })
    }

    /// One-shot sequential driver: detect the platform, install the agent if
    /// it is absent, and report the daemon registration state.
    pub fn provision(&self) -> Result<ProvisionReport, ProvisionError> {
        let platform = self.detect()?;
        let agent_was_installed = self.agent_installed(platform)?;

        let installed_now = if agent_was_installed {
            false
        } else {
            self.install(platform)?;
            true
        };

        let daemon_registered = self.daemon_registered(platform)?;
        Ok(ProvisionReport {
            platform,
            agent_was_installed,
            installed_now,
            daemon_registered,
        })
    }

    fn with_session<T>(
        &self,
        op: impl FnOnce(&mut dyn Session) -> Result<T, ProvisionError>,
    ) -> Result<T, ProvisionError> {
        let mut session = self.executor.open_session()?;
        let result = op(session.as_mut());
        if let Err(err) = session.close() {
            // Close failures never override the operation's own result.
            warn!(error = %err, "failed to close remote session");
        }
        result
    }
}

pub mod executor;
pub mod provision;
pub mod ssh;
pub mod types;

pub use executor::{ExecError, RemoteExecutor, ScriptedExecutor, Session, SessionError};
pub use provision::{ProvisionError, ProvisionReport, RemoteProvisioner, platform_from_uname};
pub use ssh::{SshAuth, SshExecutor};
pub use types::{BinarySource, InstallTarget, ParsePlatformError, Platform};

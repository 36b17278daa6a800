use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;

use tracing::debug;

use crate::executor::{ExecError, RemoteExecutor, Session, SessionError};

/// Authentication material for [`SshExecutor::connect`].
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

/// [`RemoteExecutor`] backed by an authenticated ssh2 connection.
///
/// The TCP connection and SSH handshake happen once in [`connect`]; each
/// provisioning session then execs its commands over fresh channels on the
/// shared connection.
///
/// [`connect`]: SshExecutor::connect
#[derive(Clone)]
pub struct SshExecutor {
    session: ssh2::Session,
}

impl SshExecutor {
    pub fn connect(addr: &str, user: &str, auth: &SshAuth) -> Result<Self, SessionError> {
        let tcp = TcpStream::connect(addr)
            .map_err(|err| SessionError(format!("tcp connect to {addr}: {err}")))?;
        let mut session =
            ssh2::Session::new().map_err(|err| SessionError(format!("ssh init: {err}")))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| SessionError(format!("ssh handshake with {addr}: {err}")))?;

        match auth {
            SshAuth::Password(password) => session.userauth_password(user, password),
            SshAuth::KeyFile { path, passphrase } => {
                session.userauth_pubkey_file(user, None, path, passphrase.as_deref())
            }
        }
        .map_err(|err| SessionError(format!("ssh auth for {user}@{addr}: {err}")))?;

        debug!(addr, user, "ssh connection established");
        Ok(Self { session })
    }

    /// Wrap an already-authenticated ssh2 session.
    pub fn from_session(session: ssh2::Session) -> Self {
        Self { session }
    }
}

impl RemoteExecutor for SshExecutor {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        if !self.session.authenticated() {
            return Err(SessionError("ssh session is not authenticated".to_string()));
        }
        Ok(Box::new(SshSession {
            session: self.session.clone(),
        }))
    }
}

struct SshSession {
    session: ssh2::Session,
}

impl Session for SshSession {
    fn run(&mut self, command: &str) -> Result<Vec<u8>, ExecError> {
        let transport = |err: ssh2::Error| ExecError::Transport(err.to_string());

        let mut channel = self.session.channel_session().map_err(transport)?;
        channel.exec(command).map_err(transport)?;

        let mut output = Vec::new();
        channel
            .read_to_end(&mut output)
            .map_err(|err| ExecError::Transport(err.to_string()))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|err| ExecError::Transport(err.to_string()))?;

        channel.wait_close().map_err(transport)?;
        let status = channel.exit_status().map_err(transport)?;
        debug!(command, status, "remote command finished");

        if status != 0 {
            return Err(ExecError::ExitStatus { status, stderr });
        }
        Ok(output)
    }

    fn close(&mut self) -> Result<(), SessionError> {
        // Channels are opened and drained per command; the underlying ssh
        // connection stays with the executor for later sessions.
        Ok(())
    }
}

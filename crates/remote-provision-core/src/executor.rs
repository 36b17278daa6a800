use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
#[error("session failure: {0}")]
pub struct SessionError(pub String);

/// Failure of a single remote command.
///
/// The two variants are deliberately distinct: `ExitStatus` means the command
/// ran to completion and reported failure, `Transport` means the command never
/// completed at all. State probes interpret the former as a signal and the
/// latter as an error.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command exited with status {status}: {stderr}")]
    ExitStatus { status: i32, stderr: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ExecError {
    pub fn is_exit_status(&self) -> bool {
        matches!(self, ExecError::ExitStatus { .. })
    }
}

/// One logical remote command-execution context, opened and closed per
/// provisioning operation.
pub trait Session {
    /// Run a shell command and return its standard output.
    fn run(&mut self, command: &str) -> Result<Vec<u8>, ExecError>;

    fn close(&mut self) -> Result<(), SessionError>;
}

/// The narrow remote-execution capability the provisioner consumes. Anything
/// that can open command sessions against a host qualifies; the provisioner
/// never sees connection or authentication details.
pub trait RemoteExecutor {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// In-memory executor for tests: replays a scripted queue of command results
/// and records every command and session transition it sees.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<Result<Vec<u8>, ExecError>>,
    commands: Vec<String>,
    sessions_opened: usize,
    sessions_closed: usize,
    refuse_sessions: bool,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for the next unanswered command.
    pub fn respond_ok(self, output: impl Into<Vec<u8>>) -> Self {
        self.lock().responses.push_back(Ok(output.into()));
        self
    }

    pub fn respond_err(self, err: ExecError) -> Self {
        self.lock().responses.push_back(Err(err));
        self
    }

    /// Make every subsequent `open_session` fail.
    pub fn refuse_sessions(self) -> Self {
        self.lock().refuse_sessions = true;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        let mut state = self.lock();
        if state.refuse_sessions {
            return Err(SessionError("scripted session refusal".to_string()));
        }
        state.sessions_opened += 1;
        Ok(Box::new(ScriptedSession {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    state: Arc<Mutex<ScriptState>>,
    closed: bool,
}

impl Session for ScriptedSession {
    fn run(&mut self, command: &str) -> Result<Vec<u8>, ExecError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.commands.push(command.to_string());
        state.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .sessions_closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_executor_replays_responses_in_order() {
        let executor = ScriptedExecutor::new()
            .respond_ok("first")
            .respond_err(ExecError::ExitStatus {
                status: 1,
                stderr: String::new(),
            });

        let mut session = executor.open_session().expect("failed to open session");
        assert_eq!(session.run("echo one").expect("first response"), b"first");
        assert!(session.run("echo two").is_err());
        session.close().expect("close failed");

        assert_eq!(executor.commands(), vec!["echo one", "echo two"]);
        assert_eq!(executor.sessions_opened(), 1);
        assert_eq!(executor.sessions_closed(), 1);
    }

    #[test]
    fn scripted_session_counts_close_once() {
        let executor = ScriptedExecutor::new();
        let mut session = executor.open_session().expect("failed to open session");
        session.close().expect("close failed");
        session.close().expect("close failed");
        assert_eq!(executor.sessions_closed(), 1);
    }

    #[test]
    fn refused_sessions_fail_to_open() {
        let executor = ScriptedExecutor::new().refuse_sessions();
        assert!(executor.open_session().is_err());
        assert_eq!(executor.sessions_opened(), 0);
    }
}

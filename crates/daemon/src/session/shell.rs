//! Shell subprocess session.
//!
//! A session owns one shell process with all three standard streams piped.
//! Commands go in through stdin; stdout and stderr come back out as lines
//! through an [`OutputMultiplexer`]. There is no graceful shutdown: the
//! session runs until one of its output streams dies, which moves it to
//! [`SessionState::Fatal`] for good.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;

use super::multiplexer::OutputMultiplexer;
use super::reader::StreamKind;
use crate::config::SessionConfig;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The shell could not be launched or its pipes were not captured.
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    /// The session was started twice.
    #[error("session already started")]
    AlreadyStarted,

    /// The operation needs a running session.
    #[error("session is not running (state: {0})")]
    NotRunning(SessionState),

    /// Writing to the shell's stdin failed.
    #[error("failed to write to shell: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// An output stream reached end of file.
    #[error("shell {stream} closed")]
    StreamClosed {
        /// The stream that closed.
        stream: StreamKind,
    },

    /// Reading an output stream failed.
    #[error("failed to read shell {stream}: {source}")]
    ReadFailed {
        /// The stream that failed.
        stream: StreamKind,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Both output readers are gone.
    #[error("shell output channel closed")]
    OutputClosed,

    /// A fatal error was already reported.
    #[error("session already terminated")]
    Terminated,
}

impl SessionError {
    /// Returns whether the error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::StreamClosed { .. }
                | SessionError::ReadFailed { .. }
                | SessionError::OutputClosed
                | SessionError::Terminated
        )
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, shell not launched yet.
    Uninitialized,
    /// Shell launched and output streams alive.
    Running,
    /// An output stream died. Terminal.
    Fatal,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => f.write_str("uninitialized"),
            SessionState::Running => f.write_str("running"),
            SessionState::Fatal => f.write_str("fatal"),
        }
    }
}

/// Write half of a session: the shell's stdin.
///
/// Owned by the inbound loop; nothing else writes to the shell.
pub struct ShellInput<W = ChildStdin> {
    writer: W,
    state: watch::Receiver<SessionState>,
}

impl<W> ShellInput<W>
where
    W: AsyncWrite + Unpin,
{
    /// Writes `command` and a trailing newline to the shell.
    ///
    /// Returns once the bytes are flushed to the pipe; whether and when the
    /// shell executes them is not observed.
    pub async fn submit(&mut self, command: &str) -> Result<(), SessionError> {
        let state = *self.state.borrow();
        if state != SessionState::Running {
            return Err(SessionError::NotRunning(state));
        }

        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        data.push(b'\n');

        self.writer
            .write_all(&data)
            .await
            .map_err(SessionError::WriteFailed)?;
        self.writer.flush().await.map_err(SessionError::WriteFailed)?;

        Ok(())
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Consumes the input half and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Read half of a session: the merged output lines.
///
/// Owned by the outbound task.
pub struct ShellOutput {
    multiplexer: OutputMultiplexer,
    state: watch::Sender<SessionState>,
}

impl ShellOutput {
    /// Waits for the next output line.
    ///
    /// A fatal error also moves the session to [`SessionState::Fatal`], which
    /// makes every later [`ShellInput::submit`] fail.
    pub async fn next_line(&mut self) -> Result<String, SessionError> {
        let result = self.multiplexer.next().await;

        if let Err(e) = &result {
            if e.is_fatal() && *self.state.borrow() != SessionState::Fatal {
                tracing::error!(error = %e, "Shell session is now fatal");
                self.state.send_replace(SessionState::Fatal);
            }
        }

        result
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }
}

/// Wires already-open streams into a running pair of session halves.
///
/// [`ShellSession::start`] uses this with the child's pipes; anything that
/// speaks bytes can stand in for a shell.
pub fn connect<W, O, E>(stdin: W, stdout: O, stderr: E) -> (ShellInput<W>, ShellOutput)
where
    W: AsyncWrite + Unpin,
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (state_tx, state_rx) = watch::channel(SessionState::Running);
    halves(stdin, stdout, stderr, state_tx, state_rx)
}

fn halves<W, O, E>(
    stdin: W,
    stdout: O,
    stderr: E,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
) -> (ShellInput<W>, ShellOutput)
where
    W: AsyncWrite + Unpin,
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let input = ShellInput {
        writer: stdin,
        state: state_rx,
    };
    let output = ShellOutput {
        multiplexer: OutputMultiplexer::new(stdout, stderr),
        state: state_tx,
    };
    (input, output)
}

/// A shell process and its standard streams.
pub struct ShellSession {
    config: SessionConfig,
    state_tx: Option<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    input: Option<ShellInput>,
    output: Option<ShellOutput>,
    pid: Option<u32>,
}

impl ShellSession {
    /// Creates a session; the shell is not launched until [`start`](Self::start).
    pub fn new(config: SessionConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Uninitialized);
        Self {
            config,
            state_tx: Some(state_tx),
            state_rx,
            input: None,
            output: None,
            pid: None,
        }
    }

    /// Launches the shell and starts reading its output.
    ///
    /// The child is not supervised: a background task only reaps it and logs
    /// the exit status. Its death surfaces through the output streams.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state_tx.is_none() {
            return Err(SessionError::AlreadyStarted);
        }

        let mut cmd = Command::new(&self.config.shell);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref dir) = self.config.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {}", self.config.shell, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("stderr was not captured".to_string()))?;

        self.pid = child.id();
        let state_tx = self.state_tx.take().ok_or(SessionError::AlreadyStarted)?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(status = %status, "Shell process exited"),
                Err(e) => tracing::warn!(error = %e, "Failed to wait for shell process"),
            }
        });

        state_tx.send_replace(SessionState::Running);
        let (input, output) = halves(stdin, stdout, stderr, state_tx, self.state_rx.clone());
        self.input = Some(input);
        self.output = Some(output);

        tracing::info!(
            shell = %self.config.shell,
            pid = ?self.pid,
            "Shell session started"
        );

        Ok(())
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Returns the shell's process ID once started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Writes `command` and a trailing newline to the shell.
    pub async fn submit(&mut self, command: &str) -> Result<(), SessionError> {
        match self.input.as_mut() {
            Some(input) => input.submit(command).await,
            None => Err(SessionError::NotRunning(self.state())),
        }
    }

    /// Waits for the next line of combined stdout/stderr output.
    pub async fn next_output_line(&mut self) -> Result<String, SessionError> {
        match self.output.as_mut() {
            Some(output) => output.next_line().await,
            None => Err(SessionError::NotRunning(self.state())),
        }
    }

    /// Splits a started session into its input and output halves so they can
    /// be driven by different tasks.
    pub fn split(self) -> Result<(ShellInput, ShellOutput), SessionError> {
        let state = self.state();
        match (self.input, self.output) {
            (Some(input), Some(output)) => Ok((input, output)),
            _ => Err(SessionError::NotRunning(state)),
        }
    }
}

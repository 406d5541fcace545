//! Bridge between the chat transport and the shell session.
//!
//! The [`Dispatcher`] runs two loops against one session:
//!
//! - inbound: long-poll the transport, keep authorized `$` commands and write
//!   them to the shell's stdin;
//! - outbound: forward every output line to the authorized chat.
//!
//! Both run in the same task. The dispatcher only returns when the session
//! dies, and polling stops at that moment.

use std::convert::Infallible;
use std::time::Duration;

use protocol::{framing, parse_command, Update};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{debug, info, trace, warn};

use crate::config::{Config, RetryConfig};
use crate::network::ChatTransport;
use crate::session::{SessionError, SessionState, ShellInput, ShellOutput};

/// Errors that end the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The shell session failed.
    #[error("shell session failed: {0}")]
    Session(#[from] SessionError),
}

/// Delay between failed polls.
///
/// Doubles on every consecutive failure up to `max`. An initial delay of
/// zero means "retry immediately" and never grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Creates a backoff from the `[retry]` configuration section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Starts over from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// What happened to one batch of updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Commands written to the shell.
    pub submitted: usize,
    /// Updates dropped by the sender or trigger filter.
    pub ignored: usize,
    /// Commands the shell did not accept.
    pub failed: usize,
}

/// Inbound half of the dispatcher: polling, filtering, submitting.
#[derive(Debug)]
pub struct InboundLoop {
    chat_id: i64,
    poll_timeout: u64,
    backoff: Backoff,
    offset: i64,
}

impl InboundLoop {
    /// Creates an inbound loop accepting commands from `chat_id` only.
    pub fn new(chat_id: i64, poll_timeout: u64, backoff: Backoff) -> Self {
        Self {
            chat_id,
            poll_timeout,
            backoff,
            offset: 0,
        }
    }

    /// Returns the offset sent with the next poll.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Processes a batch of updates in order.
    ///
    /// Every update advances the offset past its ID, whether or not it
    /// carried a command.
    pub async fn handle_updates<W>(
        &mut self,
        updates: Vec<Update>,
        input: &mut ShellInput<W>,
    ) -> BatchOutcome
    where
        W: AsyncWrite + Unpin,
    {
        let mut outcome = BatchOutcome::default();

        for update in updates {
            let update_id = update.update_id;
            self.offset = self.offset.max(update_id + 1);

            if update.sender_id() != Some(self.chat_id) {
                debug!(update_id, sender = ?update.sender_id(), "Ignoring update from unauthorized chat");
                outcome.ignored += 1;
                continue;
            }

            let Some(command) = update.text().and_then(parse_command) else {
                trace!(update_id, "Ignoring update without command");
                outcome.ignored += 1;
                continue;
            };

            info!(update_id, command = %command, "Submitting command");
            match input.submit(command).await {
                Ok(()) => outcome.submitted += 1,
                Err(e) => {
                    warn!(update_id, error = %e, "Failed to submit command");
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    /// Polls the transport once and handles whatever arrived.
    ///
    /// Returns `None` when the poll failed; the offset is left unchanged so
    /// the next poll asks for the same updates again.
    pub async fn poll_once<T, W>(
        &mut self,
        transport: &T,
        input: &mut ShellInput<W>,
    ) -> Option<BatchOutcome>
    where
        T: ChatTransport + ?Sized,
        W: AsyncWrite + Unpin,
    {
        match transport.poll_updates(self.offset, self.poll_timeout).await {
            Ok(updates) => {
                self.backoff.reset();
                Some(self.handle_updates(updates, input).await)
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(offset = self.offset, error = %e, retry_in_ms = delay.as_millis() as u64, "Failed to poll updates");
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                None
            }
        }
    }

    /// Polls forever.
    pub async fn run<T, W>(&mut self, transport: &T, input: &mut ShellInput<W>) -> Infallible
    where
        T: ChatTransport + ?Sized,
        W: AsyncWrite + Unpin,
    {
        loop {
            self.poll_once(transport, input).await;
        }
    }
}

/// Sends one output line to `chat_id`.
///
/// Long lines go out as several messages; empty lines are skipped. A failed
/// send drops the rest of the line.
pub async fn forward_line<T>(transport: &T, chat_id: i64, line: &str)
where
    T: ChatTransport + ?Sized,
{
    if line.is_empty() {
        trace!("Skipping empty output line");
        return;
    }

    for chunk in framing::chunks(line) {
        if let Err(e) = transport.send_message(chat_id, chunk).await {
            warn!(chat_id, error = %e, "Failed to send output line");
            return;
        }
    }
}

/// Forwards output lines until the session dies, returning the fatal error.
pub async fn forward_output<T>(
    transport: &T,
    chat_id: i64,
    output: &mut ShellOutput,
) -> SessionError
where
    T: ChatTransport + ?Sized,
{
    loop {
        match output.next_line().await {
            Ok(line) => forward_line(transport, chat_id, &line).await,
            Err(e) => return e,
        }
    }
}

/// Runs the bridge between a chat transport and one shell session.
pub struct Dispatcher<T> {
    transport: T,
    chat_id: i64,
    inbound: InboundLoop,
}

impl<T: ChatTransport> Dispatcher<T> {
    /// Creates a dispatcher from the `[telegram]` and `[retry]` settings.
    pub fn new(transport: T, config: &Config) -> Self {
        let chat_id = config.telegram.chat_id;
        Self {
            transport,
            chat_id,
            inbound: InboundLoop::new(
                chat_id,
                config.telegram.poll_timeout,
                Backoff::from_config(&config.retry),
            ),
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the offset sent with the next poll.
    pub fn offset(&self) -> i64 {
        self.inbound.offset()
    }

    /// Runs both loops until the session fails.
    pub async fn run<W>(
        &mut self,
        mut input: ShellInput<W>,
        mut output: ShellOutput,
    ) -> Result<Infallible, DispatchError>
    where
        W: AsyncWrite + Unpin,
    {
        let state = output.state();
        if state != SessionState::Running {
            return Err(SessionError::NotRunning(state).into());
        }

        let Dispatcher {
            transport,
            chat_id,
            inbound,
        } = self;

        info!(chat_id = *chat_id, "Dispatcher running");

        tokio::select! {
            err = forward_output(&*transport, *chat_id, &mut output) => {
                Err(DispatchError::Session(err))
            }
            never = inbound.run(&*transport, &mut input) => match never {},
        }
    }
}

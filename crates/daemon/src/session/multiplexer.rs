//! Shell output multiplexer.
//!
//! Merges the stdout and stderr line readers into one sequence of lines.
//! Both readers feed a single channel with room for one line, so a slow
//! consumer stalls the readers and, through the OS pipes, the shell itself.
//!
//! Lines of one stream keep their order. Lines of different streams come
//! out in whatever order the readers win the channel, which need not match
//! the order the shell wrote them in.

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::reader::{spawn_reader, StreamKind};
use super::shell::SessionError;

/// Lines that may be in flight between the readers and the consumer.
const CHANNEL_CAPACITY: usize = 1;

/// Fan-in of a shell's two output streams.
pub struct OutputMultiplexer {
    /// Receiving end shared by both readers.
    rx: mpsc::Receiver<Result<String, SessionError>>,
    /// Reader tasks, aborted on drop.
    readers: [JoinHandle<()>; 2],
    /// Set once a fatal error has been handed out.
    failed: bool,
}

impl OutputMultiplexer {
    /// Starts one reader task per stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<O, E>(stdout: O, stderr: E) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let readers = [
            spawn_reader(stdout, StreamKind::Stdout, tx.clone()),
            spawn_reader(stderr, StreamKind::Stderr, tx),
        ];

        tracing::debug!("Started output readers");

        Self {
            rx,
            readers,
            failed: false,
        }
    }

    /// Waits for the next line from either stream.
    ///
    /// The first stream failure is returned as is; every later call returns
    /// [`SessionError::Terminated`] without waiting.
    pub async fn next(&mut self) -> Result<String, SessionError> {
        if self.failed {
            return Err(SessionError::Terminated);
        }

        match self.rx.recv().await {
            Some(Ok(line)) => Ok(line),
            Some(Err(e)) => {
                self.failed = true;
                Err(e)
            }
            None => {
                self.failed = true;
                Err(SessionError::OutputClosed)
            }
        }
    }

    /// Returns whether a fatal error has been reported.
    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

impl Drop for OutputMultiplexer {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

//! Line reader for one shell output stream.
//!
//! A reader assembles bytes into `\n`-terminated lines and pushes each line,
//! with the terminator removed, into the multiplexer channel. The stream
//! ending or failing is never recovered from: the reader sends a fatal
//! [`SessionError`] down the same channel and stops.

use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::shell::SessionError;

/// Channel end a reader pushes lines (or its fatal error) into.
pub type LineSink = mpsc::Sender<Result<String, SessionError>>;

/// Record separator between lines.
const LINE_SEPARATOR: u8 = b'\n';

/// Which standard stream of the shell a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Reads `stream` line by line into `sink` until the stream dies.
///
/// Returns early and quietly only if the receiving side of `sink` is gone.
/// Bytes after the last separator at end of stream are discarded.
pub async fn read_loop<R>(stream: R, kind: StreamKind, sink: LineSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();

    let fatal = loop {
        buffer.clear();

        match reader.read_until(LINE_SEPARATOR, &mut buffer).await {
            Ok(0) => break SessionError::StreamClosed { stream: kind },
            Ok(n) if buffer.last() != Some(&LINE_SEPARATOR) => {
                tracing::debug!(
                    stream = %kind,
                    bytes = n,
                    "Discarding unterminated line at end of stream"
                );
                break SessionError::StreamClosed { stream: kind };
            }
            Ok(_) => {
                buffer.pop();
                let line = String::from_utf8_lossy(&buffer).into_owned();
                tracing::trace!(stream = %kind, line = %line, "Read line");

                if sink.send(Ok(line)).await.is_err() {
                    tracing::debug!(stream = %kind, "Line sink dropped, stopping reader");
                    return;
                }
            }
            Err(e) => break SessionError::ReadFailed { stream: kind, source: e },
        }
    };

    tracing::error!(stream = %kind, error = %fatal, "Shell output stream failed");
    let _ = sink.send(Err(fatal)).await;
}

/// Spawns [`read_loop`] as its own task.
pub fn spawn_reader<R>(stream: R, kind: StreamKind, sink: LineSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_loop(stream, kind, sink))
}

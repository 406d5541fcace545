//! Shell session module.
//!
//! This module owns the shell subprocess: line readers for its output
//! streams, the multiplexer merging them, and the session tying stdin and
//! the merged output together.

pub mod multiplexer;
pub mod reader;
pub mod shell;

pub use multiplexer::OutputMultiplexer;
pub use reader::{read_loop, spawn_reader, LineSink, StreamKind};
pub use shell::{connect, SessionError, SessionState, ShellInput, ShellOutput, ShellSession};

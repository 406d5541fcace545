//! # ussh Protocol Library
//!
//! Wire-level definitions shared by the ussh daemon:
//!
//! - **Bot API messages**: the subset of Telegram's `getUpdates` /
//!   `sendMessage` payloads the bridge reads and writes
//! - **Command protocol**: recognising `$`-prefixed chat messages and
//!   extracting the shell command they carry
//! - **Framing**: cutting long output lines into message-sized chunks
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{command, framing, Update};
//!
//! let update = Update::text_message(1, 42, "$ uname -a");
//! let payload = update.text().and_then(command::parse_command);
//! assert_eq!(payload, Some("uname -a"));
//!
//! let line = "x".repeat(5000);
//! assert_eq!(framing::chunks(&line).count(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Bot API request and response types
//! - [`command`]: trigger parsing
//! - [`framing`]: outbound message chunking
//! - [`error`]: Error types

pub mod command;
pub mod error;
pub mod framing;
pub mod messages;

pub use command::{parse_command, PREFIX_CHARS, TRIGGER};
pub use error::{ProtocolError, Result};
pub use framing::MAX_MESSAGE_CHARS;
pub use messages::{
    ApiResponse, Chat, GetUpdatesRequest, Message, SendMessageRequest, Update, ALLOWED_UPDATES,
};

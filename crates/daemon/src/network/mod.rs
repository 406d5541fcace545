//! Chat transport.
//!
//! The bridge talks to the chat service through [`ChatTransport`], which
//! abstracts the two calls it needs: long-polling for updates and sending a
//! text message. [`TelegramClient`] is the Bot API implementation.

pub mod telegram;

use std::sync::Arc;

use protocol::{ProtocolError, Update};

pub use telegram::{TelegramClient, POLL_GRACE};

/// Trait for chat transport operations.
///
/// Implementations must be usable from several tasks at once.
#[allow(async_fn_in_trait)]
pub trait ChatTransport: Send + Sync {
    /// Long-polls for updates with an ID of at least `offset`.
    ///
    /// Passing an offset acknowledges every update below it. The server
    /// holds the request for up to `timeout` seconds when nothing is pending.
    async fn poll_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, ProtocolError>;

    /// Sends `text` to `chat_id`.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ProtocolError>;
}

impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn poll_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>, ProtocolError> {
        (**self).poll_updates(offset, timeout).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ProtocolError> {
        (**self).send_message(chat_id, text).await
    }
}

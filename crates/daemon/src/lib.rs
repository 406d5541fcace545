//! # ussh Daemon Library
//!
//! This crate bridges a Telegram chat to a shell running on the host: one
//! authorized chat sends `$ command` messages, the shell runs them, and every
//! line the shell prints comes back as a chat message.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  getUpdates   ┌──────────────┐  stdin   ┌──────────────┐
//! │              │ ────────────▶ │              │ ───────▶ │              │
//! │  Bot API     │               │  Dispatcher  │          │    Shell     │
//! │  (network)   │ ◀──────────── │  (dispatch)  │ ◀─────── │  (session)   │
//! └──────────────┘  sendMessage  └──────────────┘  lines   └──────────────┘
//!                                                 stdout + stderr merged
//!                                                 by the multiplexer
//! ```
//!
//! The bridge has no shutdown path: it runs until the shell's stdout or
//! stderr ends, and that ends the process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, Dispatcher, ShellSession, TelegramClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides()?;
//!     config.validate()?;
//!
//!     let mut session = ShellSession::new(config.session.clone());
//!     session.start()?;
//!     let (input, output) = session.split()?;
//!
//!     let client = TelegramClient::from_config(&config.telegram)?;
//!     let mut dispatcher = Dispatcher::new(client, &config);
//!
//!     // Only returns once the shell is gone.
//!     let err = dispatcher.run(input, output).await.unwrap_err();
//!     Err(err.into())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, environment overrides and validation
//! - [`session`]: Shell subprocess, line readers and output multiplexer
//! - [`network`]: Chat transport trait and Telegram Bot API client
//! - [`dispatch`]: Inbound command and outbound output loops

pub mod config;
pub mod dispatch;
pub mod network;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{SessionError, SessionState, ShellInput, ShellOutput, ShellSession};

// Re-export network types for convenience
pub use network::{ChatTransport, TelegramClient};

// Re-export dispatch types for convenience
pub use dispatch::{Backoff, BatchOutcome, DispatchError, Dispatcher, InboundLoop};

//! Configuration management for the ussh daemon.
//!
//! Settings come from built-in defaults, then an optional TOML file
//! (default `~/.config/ussh/config.toml`), then the environment. A `.env`
//! file in the working directory is folded into the environment first.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Default long-poll timeout in seconds.
pub const DEFAULT_POLL_TIMEOUT: u64 = 60;

/// Largest accepted long-poll timeout in seconds.
const MAX_POLL_TIMEOUT: u64 = 600;

/// Environment variable holding the bot token.
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";

/// Environment variable holding the authorized chat ID.
pub const ENV_TARGET_CHAT_ID: &str = "TARGET_CHAT_ID";

/// Environment variable overriding the shell.
pub const ENV_SHELL: &str = "USSH_SHELL";

/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "USSH_LOG_LEVEL";

/// Environment variable overriding the Bot API URL.
pub const ENV_API_URL: &str = "USSH_API_URL";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bot token is not set (config telegram.bot_token or BOT_TOKEN)")]
    MissingBotToken,

    #[error("authorized chat ID is not set (config telegram.chat_id or TARGET_CHAT_ID)")]
    MissingChatId,

    #[error("TARGET_CHAT_ID must be an integer, got {0:?}")]
    InvalidChatId(String),

    #[error("poll_timeout must be between 0 and 600 seconds, got {0}")]
    InvalidPollTimeout(u64),

    #[error("api_url must start with http:// or https://, got {0}")]
    InvalidApiUrl(String),

    #[error("shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("max_backoff_ms ({max}) must not be lower than initial_backoff_ms ({initial})")]
    InvalidBackoff { initial: u64, max: u64 },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the ussh daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Bot API access and the authorized chat.
    pub telegram: TelegramConfig,

    /// Shell process configuration.
    pub session: SessionConfig,

    /// Poll failure retry policy.
    pub retry: RetryConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Bot API configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,

    /// The only chat allowed to send commands and receive output.
    pub chat_id: i64,

    /// Base URL of the Bot API.
    pub api_url: String,

    /// Server-side long-poll timeout in seconds.
    pub poll_timeout: u64,
}

/// Shell process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell executable.
    pub shell: String,

    /// Extra arguments passed to the shell.
    pub args: Vec<String>,

    /// Working directory of the shell. Inherited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the shell.
    pub env: BTreeMap<String, String>,
}

/// Retry policy for failed polls.
///
/// An initial backoff of zero re-polls immediately after every failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first consecutive failure, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: 0,
            api_url: DEFAULT_API_URL.to_string(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact_token(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 30_000,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ussh")
        .join("config.toml")
}

/// Loads a `.env` file into the process environment.
///
/// Uses `path` if given, otherwise looks for `.env` in the working directory
/// and its parents. Variables already set in the environment win. A missing
/// file is not an error; a malformed one is.
pub fn load_dotenv(path: Option<&Path>) -> Result<()> {
    let result = match path {
        Some(path) => dotenvy::from_path(path).map(|_| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match result {
        Ok(path) => {
            tracing::debug!("Loaded environment from {:?}", path);
            Ok(())
        }
        Err(e) if e.not_found() => {
            tracing::debug!("No .env file found");
            Ok(())
        }
        Err(e) => Err(e).context("Failed to load .env file"),
    }
}

/// Hides everything in a bot token but the bot ID.
pub fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }

    match token.split_once(':') {
        Some((bot_id, _)) => format!("{}:***", bot_id),
        None => "***".to_string(),
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values; empty
    /// values are ignored. Supported variables:
    /// - BOT_TOKEN: bot token
    /// - TARGET_CHAT_ID: authorized chat ID
    /// - USSH_SHELL: shell executable
    /// - USSH_LOG_LEVEL: log level (trace, debug, info, warn, error)
    /// - USSH_API_URL: Bot API base URL
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(token) = non_empty_var(ENV_BOT_TOKEN) {
            tracing::info!("Using bot token from environment");
            self.telegram.bot_token = token;
        }

        if let Some(chat_id) = non_empty_var(ENV_TARGET_CHAT_ID) {
            self.telegram.chat_id = chat_id
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidChatId(chat_id.clone()))?;
            tracing::info!(
                "Overriding chat_id from environment: {}",
                self.telegram.chat_id
            );
        }

        if let Some(shell) = non_empty_var(ENV_SHELL) {
            tracing::info!("Overriding shell from environment: {}", shell);
            self.session.shell = shell;
        }

        if let Some(level) = non_empty_var(ENV_LOG_LEVEL) {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }

        if let Some(url) = non_empty_var(ENV_API_URL) {
            tracing::info!("Overriding api_url from environment: {}", url);
            self.telegram.api_url = url;
        }

        Ok(())
    }

    /// Validate the configuration values.
    ///
    /// Returns the first problem found. A configuration that fails here must
    /// not be used to start the bridge.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }

        if self.telegram.chat_id == 0 {
            return Err(ConfigError::MissingChatId);
        }

        if self.telegram.poll_timeout > MAX_POLL_TIMEOUT {
            return Err(ConfigError::InvalidPollTimeout(self.telegram.poll_timeout));
        }

        let url = &self.telegram.api_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidApiUrl(url.clone()));
        }

        // Absolute paths must exist; bare names are looked up in PATH
        let shell_path = Path::new(&self.session.shell);
        if shell_path.is_absolute() {
            if !shell_path.exists() {
                return Err(ConfigError::InvalidShellPath(self.session.shell.clone()));
            }
        } else if which::which(&self.session.shell).is_err() {
            return Err(ConfigError::InvalidShellPath(self.session.shell.clone()));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                initial: self.retry.initial_backoff_ms,
                max: self.retry.max_backoff_ms,
            });
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// One line per setting, with the bot token redacted.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("bot token:      {}", redact_token(&self.telegram.bot_token)),
            format!("chat id:        {}", self.telegram.chat_id),
            format!("api url:        {}", self.telegram.api_url),
            format!("poll timeout:   {}s", self.telegram.poll_timeout),
            format!(
                "shell:          {} {}",
                self.session.shell,
                self.session.args.join(" ")
            )
            .trim_end()
            .to_string(),
            format!(
                "retry backoff:  {}ms..{}ms",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            ),
            format!("log level:      {}", self.daemon.log_level),
        ];
        if let Some(ref cwd) = self.session.cwd {
            lines.push(format!("working dir:    {}", cwd.display()));
        }
        lines.join("\n")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

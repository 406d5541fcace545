//! ussh daemon
//!
//! Runs a shell on this machine and drives it from a Telegram chat.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, load_dotenv, Config, DaemonConfig};
use daemon::dispatch::Dispatcher;
use daemon::network::TelegramClient;
use daemon::session::ShellSession;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// ussh daemon - shell access over a Telegram bot.
#[derive(Parser, Debug)]
#[command(name = "ussh-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to a .env file (defaults to .env in the working directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the shell and bridge it to the chat until the shell dies
    Start,

    /// Load and validate the configuration, then print it
    Check,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Init { force } => {
            write_default_config(&config_path, force)?;
            println!("Wrote default configuration to {}", config_path.display());
            Ok(())
        }
        Commands::Check => {
            let config = load_config(&config_path, cli.env_file.as_deref())?;
            println!("Configuration OK ({})", config_path.display());
            println!("{}", config.summary());
            Ok(())
        }
        Commands::Start => {
            let config = load_config(&config_path, cli.env_file.as_deref())?;
            let _guard = init_tracing(&config.daemon, cli.verbose)?;
            tracing::info!("ussh daemon starting...");
            run_bridge(config).await
        }
    }
}

/// Loads `.env`, the config file and environment overrides, then validates.
fn load_config(path: &Path, env_file: Option<&Path>) -> Result<Config> {
    load_dotenv(env_file)?;

    let mut config = Config::load(path)?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Writes the default configuration unless a file is already there.
fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(path)
}

/// Builds the log filter: `--verbose` wins, then `RUST_LOG`, then the config.
fn log_filter(config: &DaemonConfig, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Installs the global subscriber.
///
/// With `log_file` set, logs go to that file through a background writer;
/// the returned guard flushes it on drop and must outlive the bridge.
fn init_tracing(config: &DaemonConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = log_filter(config, verbose);

    let Some(log_file) = &config.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", log_file.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

/// Starts the shell and runs the dispatcher until the session dies.
async fn run_bridge(config: Config) -> Result<()> {
    let mut session = ShellSession::new(config.session.clone());
    session.start().context("Failed to start shell")?;
    tracing::info!(
        shell = %config.session.shell,
        pid = ?session.pid(),
        chat_id = config.telegram.chat_id,
        "Bridge ready"
    );

    let client =
        TelegramClient::from_config(&config.telegram).context("Failed to create Bot API client")?;
    let mut dispatcher = Dispatcher::new(client, &config);
    let (input, output) = session.split()?;

    match dispatcher.run(input, output).await {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(error = %e, "Bridge stopped");
            Err(e).context("Shell session ended")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_command() {
        let cli = Cli::try_parse_from(["ussh-daemon", "start"]).unwrap();
        assert!(matches!(cli.command, Commands::Start));
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_check_command() {
        let cli = Cli::try_parse_from(["ussh-daemon", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_init_command() {
        let cli = Cli::try_parse_from(["ussh-daemon", "init"]).unwrap();
        match cli.command {
            Commands::Init { force } => assert!(!force),
            _ => panic!("Expected Init command"),
        }

        let cli = Cli::try_parse_from(["ussh-daemon", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Init { force } => assert!(force),
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ussh-daemon",
            "start",
            "--config",
            "/tmp/ussh.toml",
            "--env-file",
            "/tmp/ussh.env",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ussh.toml")));
        assert_eq!(cli.env_file, Some(PathBuf::from("/tmp/ussh.env")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["ussh-daemon"]).is_err());
    }

    #[test]
    fn test_unknown_subcommand_is_error() {
        assert!(Cli::try_parse_from(["ussh-daemon", "stop"]).is_err());
    }

    #[test]
    fn test_write_default_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path, false).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# mine\n").unwrap();

        let err = write_default_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");

        write_default_config(&path, true).unwrap();
        assert_ne!(fs::read_to_string(&path).unwrap(), "# mine\n");
    }

    #[test]
    fn test_verbose_filter_is_debug() {
        let filter = log_filter(&DaemonConfig::default(), true);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}

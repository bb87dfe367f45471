//! wsync CLI
//!
//! Command-line interface for wsync - keeps a local workspace tree in step
//! with the workspace server.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsync_core::{Config, Role, Session, StorageError, UserSession};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "wsync")]
#[command(about = "wsync - workspace synchronization with the IDE server")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server-side id of the acting user
    #[arg(long, global = true)]
    user: Option<i64>,

    /// Owner of the workspaces to sync (defaults to the acting user)
    #[arg(long, global = true)]
    owner: Option<i64>,

    /// Account role, decides the sync period
    #[arg(long, global = true, value_enum, default_value_t = RoleArg::Student)]
    role: RoleArg,

    /// Test session: keep everything local
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show local workspaces and pending changes
    Status,
    /// Run one sync round
    Sync {
        /// Contact the server even with nothing to send
        #[arg(short, long)]
        force: bool,
    },
    /// Keep syncing until interrupted
    Watch,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, server_url, push_url, csrf_token, ...)
        key: String,
        /// Configuration value (empty to unset)
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Student,
    Teacher,
    Admin,
    SchoolAdmin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Student => Role::Student,
            RoleArg::Teacher => Role::Teacher,
            RoleArg::Admin => Role::Admin,
            RoleArg::SchoolAdmin => Role::SchoolAdmin,
        }
    }
}

impl Cli {
    /// Session described by the global flags
    fn session(&self) -> Session {
        let Some(user_id) = self.user else {
            return Session::NoSession;
        };
        let user = UserSession::new(user_id, self.role.into())
            .with_owner(self.owner.unwrap_or(user_id));
        if self.ephemeral {
            Session::Ephemeral(user)
        } else {
            Session::Authenticated(user)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = storage_hint(&e) {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// Hint for a storage failure anywhere in the error chain
fn storage_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StorageError>())
        .and_then(StorageError::hint)
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands work even with a broken data directory
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config = Config::load_with_cli_override(config_path)?;
    init_logging(&config);

    let session = cli.session();
    match cli.command {
        Commands::Config { .. } => Ok(()),
        Commands::Status => commands::status::show(&config, &session, &output),
        Commands::Sync { force } => commands::sync::sync(&config, session, force, &output).await,
        Commands::Watch => commands::watch::watch(&config, session, &output).await,
    }
}

/// Initialize logging
///
/// The level comes from `WSYNC_LOG` (default `warn`); `RUST_LOG` replaces
/// the whole filter when set. Logs go to `log_file` if configured, else
/// to stderr.
fn init_logging(config: &Config) {
    let log_level = std::env::var("WSYNC_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("wsync_core={},wsync_cli={}", log_level, log_level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match config.log_file {
        Some(ref log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };
            // Ignore error if already initialized
            let _ = builder.with_ansi(false).with_writer(log_file).try_init();
            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_flags() {
        let cli = Cli::parse_from(["wsync", "status"]);
        assert_eq!(cli.session(), Session::NoSession);

        let cli = Cli::parse_from(["wsync", "--user", "7", "--role", "teacher", "status"]);
        let session = cli.session();
        assert!(session.is_elevated());
        assert_eq!(session.network_user().map(|u| u.user_id), Some(7));

        let cli = Cli::parse_from(["wsync", "sync", "--user", "7", "--owner", "9", "--ephemeral"]);
        let session = cli.session();
        assert!(session.is_ephemeral());
        assert_eq!(session.user().map(|u| u.workspaces_owner_id), Some(9));
    }

    #[test]
    fn test_storage_hint_found_through_context() {
        let err = anyhow::Error::new(StorageError::CorruptSnapshot {
            path: PathBuf::from("/data/workspaces.json"),
            backup_path: PathBuf::from("/data/workspaces.json.corrupt.backup"),
            details: "EOF".to_string(),
        })
        .context("Failed to load workspaces");
        assert!(storage_hint(&err).is_some());

        let err = anyhow::anyhow!("server_url is not set");
        assert_eq!(storage_hint(&err), None);
    }

    #[test]
    fn test_sync_force_flag() {
        let cli = Cli::parse_from(["wsync", "sync", "--force"]);
        assert!(matches!(cli.command, Commands::Sync { force: true }));
    }
}

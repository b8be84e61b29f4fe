//! # linksync
//!
//! Link this machine as a companion device of a messaging account and keep
//! a local copy of its message history.
//!
//! ## Commands
//!
//! - `auth`: Pair if needed, then sync history until idle
//! - `auth status`: Report whether this device is paired
//! - `auth logout`: Invalidate the pairing
//!
//! ## Example
//!
//! ```bash
//! # Pair (shows a QR code) and import history
//! linksync auth
//!
//! # Keep syncing until Ctrl+C
//! linksync auth --follow
//!
//! # Scriptable status
//! linksync --json auth status
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod commands;
mod config;
mod duration;
mod local;
mod lock;
mod logging;
mod output;
mod qr;

use commands::auth::AuthArgs;
use commands::{auth, logout, status, App};
use config::{CliConfig, QrFormat};

/// Link this device to a messaging account and sync its history.
#[derive(Parser, Debug)]
#[command(name = "linksync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the session, store and config
    #[arg(long, global = true, env = "LINKSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Timeout for `auth status` and `auth logout` (e.g. 30s, 2m; 0 disables)
    #[arg(long, global = true, value_parser = duration::parse)]
    timeout: Option<Duration>,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair this device if needed and sync message history
    Auth(AuthCommand),
}

#[derive(Args, Debug)]
struct AuthCommand {
    /// Keep syncing until interrupted instead of exiting when idle
    #[arg(long)]
    follow: bool,

    /// Exit after this long without new messages (e.g. 30s; 0 waits for history to complete)
    #[arg(long, value_parser = duration::parse)]
    idle_exit: Option<Duration>,

    /// Download media attachments in the background
    #[arg(long)]
    download_media: bool,

    /// How to show pairing codes
    #[arg(long, value_enum)]
    qr_format: Option<QrFormat>,

    #[command(subcommand)]
    action: Option<AuthAction>,
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Show whether this device is paired
    Status,
    /// Log this device out
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    let Commands::Auth(auth_cmd) = cli.command;

    // Status must not touch the filesystem
    if !matches!(auth_cmd.action, Some(AuthAction::Status)) {
        prepare_data_dir(&data_dir).await?;
    }

    let config = CliConfig::load(&data_dir)?;
    logging::init(config.log_filter.as_deref(), cli.verbose);

    let app = App {
        timeout: cli.timeout.unwrap_or(config.command.timeout),
        data_dir,
        json: cli.json,
        config,
    };

    match auth_cmd.action {
        None => {
            let args = AuthArgs {
                follow: auth_cmd.follow,
                idle_exit: auth_cmd.idle_exit,
                download_media: auth_cmd.download_media,
                qr_format: auth_cmd.qr_format,
            };
            auth::run(&app, &args).await?;
        }
        Some(AuthAction::Status) => status::run(&app).await?,
        Some(AuthAction::Logout) => logout::run(&app).await?,
    }

    Ok(())
}

/// Create the data directory, owner-only.
async fn prepare_data_dir(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(data_dir).await
}

/// Get the default data directory for linksync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "linksync", "linksync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_auth_flags() {
        let cli = Cli::try_parse_from([
            "linksync",
            "auth",
            "--follow",
            "--idle-exit",
            "1m30s",
            "--qr-format",
            "text",
        ])
        .unwrap();
        let Commands::Auth(auth) = cli.command;
        assert!(auth.follow);
        assert_eq!(auth.idle_exit, Some(Duration::from_secs(90)));
        assert_eq!(auth.qr_format, Some(QrFormat::Text));
        assert!(auth.action.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["linksync", "auth", "status", "--json", "--timeout", "5s"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.timeout, Some(Duration::from_secs(5)));
        let Commands::Auth(auth) = cli.command;
        assert!(matches!(auth.action, Some(AuthAction::Status)));
    }

    #[test]
    fn rejects_bad_duration() {
        assert!(Cli::try_parse_from(["linksync", "auth", "--idle-exit", "soon"]).is_err());
    }
}

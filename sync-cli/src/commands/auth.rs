//! Pair this device if needed and sync message history.

use anyhow::Result;
use std::time::Duration;
use sync_client::SyncOptions;
use sync_types::SyncMode;

use super::{describe, shutdown_token, App};
use crate::config::QrFormat;
use crate::output::{write_json, AuthReport};
use crate::qr;

/// Flags of `linksync auth`.
#[derive(Debug, Clone, Default)]
pub struct AuthArgs {
    /// Keep syncing until interrupted.
    pub follow: bool,
    /// Idle window override.
    pub idle_exit: Option<Duration>,
    /// Download media in the background.
    pub download_media: bool,
    /// Pairing code output override.
    pub qr_format: Option<QrFormat>,
}

/// Run the auth command.
///
/// Not bounded by `--timeout`: it ends on idle, history completion or a
/// signal.
pub async fn run(app: &App, args: &AuthArgs) -> Result<()> {
    let _lock = app.lock()?;
    let engine = app.engine();
    let cancel = shutdown_token();

    eprintln!("Starting authentication...");
    let result = engine
        .sync(&cancel, sync_options(app, args))
        .await
        .map_err(|e| describe(e, &cancel, Duration::ZERO))?;

    if app.json {
        return write_json(&AuthReport {
            authenticated: true,
            messages_stored: result.messages_stored,
            warnings: result.warnings,
        });
    }

    println!("Authenticated. Messages stored: {}", result.messages_stored);
    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Map flags and config onto engine options. Flags win over config.
fn sync_options(app: &App, args: &AuthArgs) -> SyncOptions {
    let auth = &app.config.auth;
    let mode = if args.follow {
        SyncMode::Follow
    } else {
        SyncMode::Bootstrap
    };
    let qr_format = args.qr_format.unwrap_or(auth.qr_format);

    SyncOptions::new(mode)
        .with_allow_qr(true)
        .with_refresh_contacts(true)
        .with_refresh_groups(true)
        .with_download_media(args.download_media || auth.download_media)
        .with_idle_exit(args.idle_exit.unwrap_or(auth.idle_exit))
        .with_max_media_downloads(auth.max_media_downloads)
        .on_qr_code(move |code| qr::show(qr_format, code))
}

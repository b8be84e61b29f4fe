//! CLI command implementations.

pub mod auth;
pub mod logout;
pub mod status;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{SyncEngine, SyncError};
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;
use crate::duration;
use crate::local::{FileStore, LocalSession};
use crate::lock::DataDirLock;

/// Engine over the data-directory collaborators.
pub type Engine = SyncEngine<LocalSession, FileStore>;

/// Settings every command receives.
#[derive(Debug)]
pub struct App {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Print JSON instead of text.
    pub json: bool,
    /// Loaded configuration.
    pub config: CliConfig,
    /// Timeout for status and logout (zero disables).
    pub timeout: Duration,
}

impl App {
    /// Build the engine for this data directory. Does no I/O.
    pub fn engine(&self) -> Engine {
        let session = LocalSession::new(
            &self.data_dir,
            self.config.local.scan_delay,
            self.config.local.code_ttl,
        );
        let store = FileStore::new(&self.data_dir);
        SyncEngine::new(Arc::new(session), Arc::new(store))
    }

    /// Take the data-directory lock.
    pub fn lock(&self) -> Result<DataDirLock> {
        Ok(DataDirLock::acquire(&self.data_dir)?)
    }
}

/// Token cancelled on Ctrl+C or SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::info!("shutdown signal received");
                trigger.cancel();
            }
            _ = trigger.cancelled() => {}
        }
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Child of `parent` that is also cancelled after `timeout` (zero: never).
pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    if timeout.is_zero() {
        return child;
    }
    let trigger = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(timeout = %duration::format(timeout), "command timed out");
                trigger.cancel();
            }
            _ = trigger.cancelled() => {}
        }
    });
    child
}

/// Attach a readable cause to an engine error.
///
/// A `Cancelled` that did not come from a signal was the command timeout.
pub fn describe(err: SyncError, signal: &CancellationToken, timeout: Duration) -> anyhow::Error {
    match err {
        SyncError::Cancelled if !signal.is_cancelled() && !timeout.is_zero() => {
            anyhow::anyhow!("timed out after {}", duration::format(timeout))
        }
        SyncError::Cancelled => anyhow::anyhow!("interrupted"),
        SyncError::Unauthenticated => {
            anyhow::anyhow!("not authenticated; run `linksync auth` to pair this device")
        }
        other => anyhow::Error::new(other),
    }
}

#[cfg(test)]
impl App {
    /// App over a temporary directory with fast pairing.
    pub fn for_test(data_dir: &std::path::Path, json: bool) -> Self {
        let mut config = CliConfig::default();
        config.local.scan_delay = Duration::from_millis(20);
        config.auth.idle_exit = Duration::from_millis(100);
        Self {
            data_dir: data_dir.to_path_buf(),
            json,
            config,
            timeout: Duration::from_secs(10),
        }
    }
}

//! Local session client.
//!
//! Credentials live in `session.json`. Pairing issues fresh codes every
//! `code_ttl` and treats the device as scanned after `scan_delay`. History,
//! contacts, groups and media are replayed from the `remote/` directory.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sync_client::{EventStream, PairingStream, SessionClient, SessionError};
use sync_types::{Contact, Group, MediaRef, PairingCode, PairingEvent, SessionEvent, StoredMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{file_name, read_json};
use crate::config::set_file_permissions_0600;

/// Credentials file inside the data directory.
pub const SESSION_FILE: &str = "session.json";

const REMOTE_DIR: &str = "remote";
const HISTORY_BATCH: usize = 50;
const EVENT_CAPACITY: usize = 256;

/// Failures creating or persisting credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The OS random source failed.
    #[error("no randomness available: {0}")]
    Random(getrandom::Error),
    /// The system clock is before the Unix epoch.
    #[error("system clock is before 1970: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    /// Credentials could not be serialized.
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    /// The session file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Session file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The session file could not be made private.
    #[error("failed to restrict session file: {0:#}")]
    Permissions(anyhow::Error),
}

/// Persisted credentials of a paired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Random id assigned at pairing.
    pub device_id: String,
    /// Unix time of the scan.
    pub paired_at: u64,
}

impl SessionState {
    /// Credentials for a freshly paired device.
    pub fn new() -> Result<Self, CredentialsError> {
        let device_id = URL_SAFE_NO_PAD.encode(random_bytes::<16>()?);
        let paired_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        Ok(Self {
            device_id,
            paired_at,
        })
    }

    /// Load credentials, `None` if never paired.
    pub async fn load(data_dir: &Path) -> Result<Option<Self>, SessionError> {
        read_json(&data_dir.join(SESSION_FILE))
            .await
            .map_err(|e| SessionError::Protocol(format!("invalid session file {}", e)))
    }

    /// Save credentials with owner-only permissions.
    pub async fn save(&self, data_dir: &Path) -> Result<(), CredentialsError> {
        let path = data_dir.join(SESSION_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        if let Err(source) = tokio::fs::write(&path, contents).await {
            return Err(CredentialsError::Write { path, source });
        }
        set_file_permissions_0600(&path)
            .await
            .map_err(CredentialsError::Permissions)
    }

    /// Delete stored credentials. Missing file is fine.
    pub async fn remove(data_dir: &Path) -> Result<(), SessionError> {
        match tokio::fs::remove_file(data_dir.join(SESSION_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Protocol(format!(
                "failed to remove session file: {}",
                e
            ))),
        }
    }
}

/// Session client backed by the data directory.
#[derive(Debug)]
pub struct LocalSession {
    data_dir: PathBuf,
    scan_delay: Duration,
    code_ttl: Duration,
    inner: Arc<Mutex<LocalInner>>,
}

#[derive(Debug, Default)]
struct LocalInner {
    opened: bool,
    state: Option<SessionState>,
    connected: bool,
    events: Option<mpsc::Sender<SessionEvent>>,
    pairing: Option<JoinHandle<()>>,
    backfill: Option<JoinHandle<()>>,
}

impl LocalSession {
    /// Create a session over a data directory.
    pub fn new(data_dir: &Path, scan_delay: Duration, code_ttl: Duration) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            scan_delay,
            code_ttl,
            inner: Arc::new(Mutex::new(LocalInner::default())),
        }
    }

    fn remote(&self, name: &str) -> PathBuf {
        self.data_dir.join(REMOTE_DIR).join(name)
    }

    fn lock(&self) -> MutexGuard<'_, LocalInner> {
        lock(&self.inner)
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        if self.lock().connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }
}

#[async_trait]
impl SessionClient for LocalSession {
    async fn open(&self) -> Result<(), SessionError> {
        if self.lock().opened {
            return Ok(());
        }
        let state = SessionState::load(&self.data_dir).await?;
        tracing::debug!(paired = state.is_some(), "session opened");

        let mut inner = self.lock();
        inner.state = state;
        inner.opened = true;
        Ok(())
    }

    fn is_authed(&self) -> bool {
        self.lock().state.is_some()
    }

    async fn pairing_codes(&self) -> Result<PairingStream, SessionError> {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_pairing(
            tx,
            Arc::clone(&self.inner),
            self.data_dir.clone(),
            self.scan_delay,
            self.code_ttl,
        ));
        if let Some(previous) = self.lock().pairing.replace(task) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        let Some(state) = &inner.state else {
            return Err(SessionError::NotAuthenticated);
        };
        tracing::debug!(device = %state.device_id, "connected");
        inner.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn subscribe(&self) -> Result<EventStream, SessionError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(SessionError::NotConnected);
        }
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        inner.events = Some(tx);
        Ok(rx)
    }

    async fn request_backfill(&self) -> Result<(), SessionError> {
        self.require_connected()?;
        let Some(events) = self.lock().events.clone() else {
            return Err(SessionError::Protocol("backfill requested before subscribe".into()));
        };

        let history = self.remote("history.json");
        let task = tokio::spawn(async move {
            let messages = match read_json::<Vec<StoredMessage>>(&history).await {
                Ok(messages) => messages.unwrap_or_default(),
                Err(reason) => {
                    let _ = events.send(SessionEvent::Disconnected { reason }).await;
                    return;
                }
            };
            tracing::debug!(count = messages.len(), "replaying history");
            for chunk in messages.chunks(HISTORY_BATCH) {
                if events
                    .send(SessionEvent::HistoryBatch(chunk.to_vec()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            let _ = events.send(SessionEvent::HistoryComplete).await;
        });
        if let Some(previous) = self.lock().backfill.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, SessionError> {
        self.require_connected()?;
        read_json(&self.remote("contacts.json"))
            .await
            .map(Option::unwrap_or_default)
            .map_err(SessionError::Protocol)
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, SessionError> {
        self.require_connected()?;
        read_json(&self.remote("groups.json"))
            .await
            .map(Option::unwrap_or_default)
            .map_err(SessionError::Protocol)
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, SessionError> {
        self.require_connected()?;
        let name = media.direct_path.rsplit('/').next().unwrap_or_default();
        let path = self.remote("media").join(file_name(name));
        tokio::fs::read(&path)
            .await
            .map_err(|e| SessionError::Media(format!("{}: {}", media.direct_path, e)))
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.require_connected()?;
        SessionState::remove(&self.data_dir).await?;
        self.lock().state = None;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.events = None;
        for task in [inner.pairing.take(), inner.backfill.take()].into_iter().flatten() {
            task.abort();
        }
        Ok(())
    }
}

async fn run_pairing(
    tx: mpsc::Sender<PairingEvent>,
    inner: Arc<Mutex<LocalInner>>,
    data_dir: PathBuf,
    scan_delay: Duration,
    code_ttl: Duration,
) {
    let mut remaining = scan_delay;
    loop {
        let code = match pairing_code() {
            Ok(code) => code,
            Err(e) => {
                let _ = tx.send(PairingEvent::Failed(e.to_string())).await;
                return;
            }
        };
        if tx.send(PairingEvent::Code(code)).await.is_err() {
            return;
        }

        let wait = if code_ttl.is_zero() {
            remaining
        } else {
            remaining.min(code_ttl)
        };
        tokio::select! {
            _ = tx.closed() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        if wait >= remaining {
            break;
        }
        remaining -= wait;
    }

    let saved = match SessionState::new() {
        Ok(state) => state.save(&data_dir).await.map(|()| state),
        Err(e) => Err(e),
    };
    let event = match saved {
        Ok(state) => {
            tracing::info!(device = %state.device_id, "device paired");
            lock(&inner).state = Some(state);
            PairingEvent::Success
        }
        Err(e) => {
            tracing::warn!("could not store credentials: {}", e);
            PairingEvent::Failed(e.to_string())
        }
    };
    let _ = tx.send(event).await;
}

fn pairing_code() -> Result<PairingCode, CredentialsError> {
    let reference = URL_SAFE_NO_PAD.encode(random_bytes::<16>()?);
    let key = STANDARD.encode(random_bytes::<32>()?);
    Ok(PairingCode::new(format!("2@{},{}", reference, key)))
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CredentialsError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(CredentialsError::Random)?;
    Ok(bytes)
}

fn lock(inner: &Mutex<LocalInner>) -> MutexGuard<'_, LocalInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

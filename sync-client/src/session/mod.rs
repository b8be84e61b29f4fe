//! Session client abstraction for linksync.
//!
//! This module provides a pluggable seam over the messaging-protocol client
//! that owns the connection, the pairing handshake and the credential state.
//! The sync engine only drives it; it never persists the session itself.
//!
//! # Design
//!
//! The trait is async and connection-oriented:
//! - `open()` loads local credential state without touching the network
//! - `pairing_codes()` starts QR pairing and yields codes until scanned
//! - `connect()` establishes a connection (requires credentials)
//! - `subscribe()` / `request_backfill()` feed history and live events
//! - `disconnect()` gracefully terminates
//!
//! # Example
//!
//! ```ignore
//! let session = MockSessionClient::new();
//! session.set_authed(true);
//! session.connect().await?;
//! let mut events = session.subscribe().await?;
//! ```

mod mock;

pub use mock::MockSessionClient;

use async_trait::async_trait;
use sync_types::{Contact, Group, MediaRef, PairingEvent, SessionEvent};
use thiserror::Error;
use tokio::sync::mpsc;

/// Stream of pairing events for one pairing attempt.
pub type PairingStream = mpsc::Receiver<PairingEvent>;

/// Stream of inbound session events.
pub type EventStream = mpsc::Receiver<SessionEvent>;

/// Session client errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No credentials stored.
    #[error("session not authenticated")]
    NotAuthenticated,

    /// Connection or handshake failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// The server answered something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Media download failed.
    #[error("media download failed: {0}")]
    Media(String),
}

/// The messaging-protocol client driven by the sync engine.
///
/// Implementations own connection, pairing handshake, message transport and
/// credential state. A single instance must not be driven by two sync runs
/// at once.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// Load local credential state. Never pairs, never connects.
    ///
    /// Must be idempotent.
    async fn open(&self) -> Result<(), SessionError>;

    /// Whether credentials for a paired device exist.
    fn is_authed(&self) -> bool;

    /// Start QR pairing and return the stream of pairing events.
    ///
    /// The stream ends after `Success`, `Failed`, or `Expired`; calling
    /// again requests fresh codes.
    async fn pairing_codes(&self) -> Result<PairingStream, SessionError>;

    /// Connect using stored credentials.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Subscribe to inbound events (history and live messages).
    async fn subscribe(&self) -> Result<EventStream, SessionError>;

    /// Ask the server to send historical backfill over the event stream.
    async fn request_backfill(&self) -> Result<(), SessionError>;

    /// Fetch the current contact list.
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, SessionError>;

    /// Fetch the groups this account belongs to.
    async fn fetch_groups(&self) -> Result<Vec<Group>, SessionError>;

    /// Download and decrypt a media blob.
    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, SessionError>;

    /// Invalidate the session server-side and clear local credentials.
    async fn logout(&self) -> Result<(), SessionError>;

    /// Close the connection gracefully. Safe to call when not connected.
    async fn disconnect(&self) -> Result<(), SessionError>;
}

//! Errors returned by the sync engine.

use crate::session::SessionError;
use crate::store::StoreError;
use thiserror::Error;

/// Sync engine errors.
///
/// Side-task failures are never errors; they come back as warnings in
/// [`SyncResult`](sync_types::SyncResult).
#[derive(Debug, Error)]
pub enum SyncError {
    /// No credentials and pairing was not allowed, or the scan was declined.
    #[error("not authenticated")]
    Unauthenticated,

    /// Pairing codes expired before one was scanned.
    #[error("pairing code expired")]
    PairingExpired,

    /// Connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Server-side session invalidation failed.
    #[error("logout failed: {0}")]
    Logout(#[source] SessionError),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,
}

impl From<SessionError> for SyncError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotAuthenticated => SyncError::Unauthenticated,
            other => SyncError::Connection(other.to_string()),
        }
    }
}

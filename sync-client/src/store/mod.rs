//! Persistence abstraction for linksync.
//!
//! The sync engine hands every accepted message, contact list, group list
//! and media blob to a [`Store`]. A write that returns `Ok` is considered
//! durable; the engine's message count only includes those.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use sync_types::{Contact, Group, MessageId, StoredMessage};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write was rejected.
    #[error("write failed: {0}")]
    Write(String),

    /// A read failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Persisted data could not be decoded.
    #[error("corrupt store data: {0}")]
    Corrupt(String),
}

/// Persistence for synced data.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Insert or replace a message (keyed by message id).
    async fn store_message(&self, message: &StoredMessage) -> Result<(), StoreError>;

    /// Insert or replace contacts.
    async fn store_contacts(&self, contacts: &[Contact]) -> Result<(), StoreError>;

    /// Insert or replace groups.
    async fn store_groups(&self, groups: &[Group]) -> Result<(), StoreError>;

    /// Save downloaded media bytes for a message.
    async fn store_media(&self, message: &MessageId, bytes: &[u8]) -> Result<(), StoreError>;

    /// Number of distinct messages stored.
    async fn message_count(&self) -> Result<u64, StoreError>;
}

//! # sync-client
//!
//! Sync engine for linksync.
//!
//! This is the library a command surface or application drives to pair a
//! device, connect, and ingest message history.
//!
//! ## Features
//!
//! - **Pairing**: QR-code pairing with regenerated codes, shown once each
//! - **Sync Modes**: bootstrap with idle exit, once, and continuous follow
//! - **Side Tasks**: contact/group refresh and bounded media downloads that
//!   report warnings instead of failing the run
//! - **Pluggable Collaborators**: [`SessionClient`] and [`Store`] traits with
//!   mock and in-memory implementations
//! - **Pure State Machine**: uses sync-core for side-effect-free phase logic
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{MemoryStore, MockSessionClient, SyncEngine, SyncOptions};
//! use sync_types::SyncMode;
//!
//! let engine = SyncEngine::new(Arc::new(MockSessionClient::authenticated()), Arc::new(MemoryStore::new()));
//! let result = engine.sync(&CancellationToken::new(), SyncOptions::new(SyncMode::Once)).await?;
//! println!("stored {}", result.messages_stored);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod session;
pub mod store;
pub mod tasks;

pub use engine::{
    QrCallback, SyncEngine, SyncOptions, DEFAULT_DRAIN_TIMEOUT, DEFAULT_IDLE_EXIT,
    DEFAULT_MAX_MEDIA_DOWNLOADS,
};
pub use error::SyncError;
pub use session::{EventStream, MockSessionClient, PairingStream, SessionClient, SessionError};
pub use store::{MemoryStore, Store, StoreError};
pub use tasks::TaskGroup;

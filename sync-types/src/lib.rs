//! # sync-types
//!
//! Shared data model for linksync.
//!
//! This crate provides the foundational types used across all linksync crates:
//! - [`ChatId`], [`MessageId`], [`PairingCode`] - Identity types
//! - [`StoredMessage`], [`Contact`], [`Group`] - Records persisted by a store
//! - [`SessionEvent`], [`PairingEvent`] - What a session client reports
//! - [`SyncMode`], [`SyncResult`] - The sync contract
//! - [`TypesError`] - Parse errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;
mod mode;
mod records;
mod result;

pub use error::TypesError;
pub use events::{PairingEvent, SessionEvent};
pub use ids::{ChatId, MessageId, PairingCode};
pub use mode::SyncMode;
pub use records::{Contact, Group, MediaRef, StoredMessage};
pub use result::{SyncResult, SyncWarning, WarningKind};

//! # sync-core
//!
//! Pure logic for linksync (no I/O, instant tests).
//!
//! This crate implements the sync phase state machine and the decisions
//! around it without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (pairing, connecting, storing) is performed by
//! `sync-client`, which interprets the actions produced by these state
//! machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pairing;
pub mod policy;
pub mod state;

pub use pairing::{CodeDecision, PairingError, PairingTracker};
pub use policy::{ExitPolicy, ONCE_GRACE};
pub use state::{Action, Event, SyncPhase};

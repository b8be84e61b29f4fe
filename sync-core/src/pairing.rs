//! Pairing-code bookkeeping for QR device linking.
//!
//! A session client hands out pairing codes over one or more streams. The
//! user must see every distinct code exactly once, and in order:
//! - Blank codes are never shown
//! - A code repeated by the session is not shown again
//! - Codes from a regenerated stream count as new codes
//!
//! The tracker holds only hashes of shown codes, never the codes themselves.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use sync_types::PairingCode;
use thiserror::Error;

/// Error type for pairing bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// A pairing stream closed without issuing any code.
    #[error("pairing stream ended without issuing a code")]
    EmptyStream,
}

/// What to do with a code reported by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDecision {
    /// New code: hand it to the caller.
    Show,
    /// Already shown: skip.
    Duplicate,
    /// Empty payload: skip.
    Blank,
}

/// Tracks which pairing codes have been shown during one pairing attempt.
#[derive(Debug, Clone, Default)]
pub struct PairingTracker {
    seen: HashSet<u64>,
    shown: u32,
    streams: u32,
    codes_in_stream: u32,
}

impl PairingTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a new pairing stream was requested.
    ///
    /// Fails if the previous stream ended without issuing a single code,
    /// which would otherwise turn into a tight request loop.
    pub fn start_stream(&mut self) -> Result<(), PairingError> {
        if self.streams > 0 && self.codes_in_stream == 0 {
            return Err(PairingError::EmptyStream);
        }
        self.streams = self.streams.saturating_add(1);
        self.codes_in_stream = 0;
        Ok(())
    }

    /// Decide whether a code should be shown, and record it if so.
    pub fn observe(&mut self, code: &PairingCode) -> CodeDecision {
        if code.is_blank() {
            return CodeDecision::Blank;
        }
        self.codes_in_stream = self.codes_in_stream.saturating_add(1);
        if self.seen.insert(fingerprint(code)) {
            self.shown = self.shown.saturating_add(1);
            CodeDecision::Show
        } else {
            CodeDecision::Duplicate
        }
    }

    /// Number of distinct codes shown so far.
    pub fn shown(&self) -> u32 {
        self.shown
    }

    /// Number of streams requested so far.
    pub fn streams(&self) -> u32 {
        self.streams
    }
}

fn fingerprint(code: &PairingCode) -> u64 {
    let mut hasher = DefaultHasher::new();
    code.as_str().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shows_each_distinct_code_once() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();

        assert_eq!(tracker.observe(&PairingCode::new("2@a")), CodeDecision::Show);
        assert_eq!(tracker.observe(&PairingCode::new("2@b")), CodeDecision::Show);
        assert_eq!(
            tracker.observe(&PairingCode::new("2@a")),
            CodeDecision::Duplicate
        );
        assert_eq!(tracker.shown(), 2);
    }

    #[test]
    fn blank_codes_are_skipped() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();

        assert_eq!(tracker.observe(&PairingCode::new("")), CodeDecision::Blank);
        assert_eq!(tracker.observe(&PairingCode::new("  ")), CodeDecision::Blank);
        assert_eq!(tracker.shown(), 0);
    }

    #[test]
    fn regenerated_stream_codes_are_new() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();
        tracker.observe(&PairingCode::new("2@first"));

        tracker.start_stream().unwrap();
        assert_eq!(
            tracker.observe(&PairingCode::new("2@second")),
            CodeDecision::Show
        );
        assert_eq!(tracker.streams(), 2);
        assert_eq!(tracker.shown(), 2);
    }

    #[test]
    fn empty_stream_is_rejected_on_next_request() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();
        // no code observed
        assert_eq!(tracker.start_stream(), Err(PairingError::EmptyStream));
    }

    #[test]
    fn blank_only_stream_counts_as_empty() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();
        tracker.observe(&PairingCode::new(""));
        assert_eq!(tracker.start_stream(), Err(PairingError::EmptyStream));
    }

    #[test]
    fn duplicate_only_stream_is_not_empty() {
        let mut tracker = PairingTracker::new();
        tracker.start_stream().unwrap();
        tracker.observe(&PairingCode::new("2@same"));
        tracker.start_stream().unwrap();
        assert_eq!(
            tracker.observe(&PairingCode::new("2@same")),
            CodeDecision::Duplicate
        );
        assert!(tracker.start_stream().is_ok());
    }
}

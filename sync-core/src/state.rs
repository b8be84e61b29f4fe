//! Sync phase state machine for linksync.
//!
//! This module provides a pure, side-effect-free state machine for a single
//! sync run. The state machine takes events as input and produces a new
//! phase plus a list of actions to execute.
//!
//! The actual I/O (pairing, connecting, storing) is performed by
//! sync-client, not by this module. Exit decisions (idle timeout, history
//! complete) live here so they can be tested without a runtime.
//!
//! ```text
//! Starting ─▶ Unauthenticated ─▶ Pairing ─┐
//!    │                                    ▼
//!    └──────────────────────────────▶ Connecting ─▶ Connected ─▶ Ingesting ─▶ Done | IdleTimeout
//!                                                       │
//!                                                       └──────▶ Following
//! (any phase) ─▶ Closed
//! ```

use crate::policy::ExitPolicy;

/// Phase of a sync run - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    /// Session opened, credentials not yet inspected.
    Starting,
    /// No credentials on the session.
    Unauthenticated,
    /// Waiting for a pairing code to be scanned.
    Pairing {
        /// Distinct codes shown so far.
        codes_shown: u32,
    },
    /// Credentials exist, transport connection in progress.
    Connecting,
    /// Transport is up, ingestion not yet started.
    Connected,
    /// Bounded ingestion (bootstrap or once).
    Ingesting {
        /// When this run is allowed to finish.
        policy: ExitPolicy,
    },
    /// Unbounded live ingestion.
    Following,
    /// Bounded run finished because nothing arrived for the idle window.
    IdleTimeout,
    /// Bounded run finished because the backfill completed.
    Done,
    /// Session disconnected, run over.
    Closed,
}

impl SyncPhase {
    /// Create a new state machine in the Starting phase.
    pub fn new() -> Self {
        Self::Starting
    }

    /// Process an event and return the new phase plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Starting
            (Self::Starting, Event::Opened { authenticated: true }) => (Self::Connecting, vec![]),
            (Self::Starting, Event::Opened { authenticated: false }) => {
                (Self::Unauthenticated, vec![])
            }

            // From Unauthenticated
            (Self::Unauthenticated, Event::PairingAllowed) => (
                Self::Pairing { codes_shown: 0 },
                vec![Action::RequestPairingCode],
            ),
            (Self::Unauthenticated, Event::PairingDenied) => (Self::Closed, vec![Action::Disconnect]),

            // From Pairing
            (Self::Pairing { codes_shown }, Event::PairingCodeIssued) => (
                Self::Pairing {
                    codes_shown: codes_shown.saturating_add(1),
                },
                vec![Action::ShowPairingCode],
            ),
            (Self::Pairing { codes_shown }, Event::PairingCodeExpired) => {
                (Self::Pairing { codes_shown }, vec![Action::RequestPairingCode])
            }
            (Self::Pairing { .. }, Event::Paired) => (Self::Connecting, vec![]),
            (Self::Pairing { .. }, Event::PairingRejected) => (Self::Closed, vec![Action::Disconnect]),

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (Self::Connected, vec![]),
            (Self::Connecting, Event::ConnectFailed) => (Self::Closed, vec![Action::Disconnect]),

            // From Connected
            (Self::Connected, Event::IngestStarted { policy }) => {
                if policy.is_unbounded() {
                    (Self::Following, vec![])
                } else {
                    (Self::Ingesting { policy }, vec![Action::ResetIdleTimer])
                }
            }

            // From Ingesting
            (Self::Ingesting { policy }, Event::MessageStored) => {
                (Self::Ingesting { policy }, vec![Action::ResetIdleTimer])
            }
            (Self::Ingesting { policy }, Event::HistoryComplete) => {
                if policy.exit_on_history_complete {
                    (Self::Done, vec![Action::Finish])
                } else {
                    (Self::Ingesting { policy }, vec![])
                }
            }
            (Self::Ingesting { policy }, Event::IdleElapsed) => {
                if policy.idle_window.is_some() {
                    (Self::IdleTimeout, vec![Action::Finish])
                } else {
                    (Self::Ingesting { policy }, vec![])
                }
            }
            (Self::Ingesting { .. }, Event::StreamEnded) => (Self::Done, vec![Action::Finish]),

            // From Following: only cancellation or a broken stream ends it
            (Self::Following, Event::StreamEnded) => (Self::Closed, vec![Action::Disconnect]),

            // Transport loss is fatal wherever the session is live
            (Self::Connected | Self::Ingesting { .. } | Self::Following, Event::ConnectionLost) => {
                (Self::Closed, vec![Action::Disconnect])
            }
            (Self::Ingesting { .. } | Self::Following, Event::StoreFailed) => {
                (Self::Closed, vec![Action::Disconnect])
            }

            // Cancellation: a clean stop while following, an error elsewhere
            (Self::Following, Event::Cancelled) => {
                (Self::Closed, vec![Action::Finish, Action::Disconnect])
            }
            (Self::Closed, Event::Cancelled) => (Self::Closed, vec![]),
            (_, Event::Cancelled) => (Self::Closed, vec![Action::Disconnect]),

            // Closing is allowed from anywhere
            (Self::Closed, Event::Closed) => (Self::Closed, vec![]),
            (_, Event::Closed) => (Self::Closed, vec![Action::Disconnect]),

            // Invalid transitions - stay in current phase
            (phase, _) => (phase, vec![]),
        }
    }

    /// Check if the run has ended (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::IdleTimeout | Self::Done | Self::Closed
        )
    }

    /// Check if messages are being ingested.
    pub fn is_ingesting(&self) -> bool {
        matches!(self, Self::Ingesting { .. } | Self::Following)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Unauthenticated => "unauthenticated",
            Self::Pairing { .. } => "pairing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ingesting { .. } => "ingesting",
            Self::Following => "following",
            Self::IdleTimeout => "idle_timeout",
            Self::Done => "done",
            Self::Closed => "closed",
        }
    }

    /// The idle window in force, if the run is bounded and ingesting.
    pub fn idle_window(&self) -> Option<std::time::Duration> {
        match self {
            Self::Ingesting { policy } => policy.idle_window,
            _ => None,
        }
    }
}

impl Default for SyncPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur during a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Session opened; credentials inspected.
    Opened {
        /// Whether the session already holds credentials.
        authenticated: bool,
    },
    /// Caller permits QR pairing.
    PairingAllowed,
    /// Caller forbids QR pairing.
    PairingDenied,
    /// A new distinct pairing code was issued.
    PairingCodeIssued,
    /// The current pairing stream expired without a scan.
    PairingCodeExpired,
    /// Pairing succeeded.
    Paired,
    /// The phone rejected pairing.
    PairingRejected,
    /// Transport connection established.
    ConnectSucceeded,
    /// Transport connection failed.
    ConnectFailed,
    /// Subscription is up; ingestion begins under this policy.
    IngestStarted {
        /// Exit policy for the run.
        policy: ExitPolicy,
    },
    /// The store accepted a message.
    MessageStored,
    /// The session reports no more history.
    HistoryComplete,
    /// The idle deadline passed with no new message.
    IdleElapsed,
    /// The event stream ended.
    StreamEnded,
    /// The session reported a disconnect.
    ConnectionLost,
    /// The store rejected a write.
    StoreFailed,
    /// The caller cancelled the run.
    Cancelled,
    /// The engine is tearing the run down.
    Closed,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. A transition to `Closed`
/// carries `Disconnect` exactly once; a run that ends without `Finish` is a
/// failure and the caller returns its own error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the session for a (new) pairing-code stream.
    RequestPairingCode,
    /// Hand the current code to the caller's QR callback.
    ShowPairingCode,
    /// Push the idle deadline out by the idle window.
    ResetIdleTimer,
    /// Stop ingesting and return the accumulated result.
    Finish,
    /// Disconnect the session.
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sync_types::SyncMode;

    fn bootstrap(idle: Duration) -> ExitPolicy {
        ExitPolicy::for_mode(SyncMode::Bootstrap, idle)
    }

    fn ingesting(idle: Duration) -> SyncPhase {
        let (phase, _) = SyncPhase::Connected.on_event(Event::IngestStarted {
            policy: bootstrap(idle),
        });
        phase
    }

    // ===========================================
    // Authentication Path
    // ===========================================

    #[test]
    fn authenticated_session_goes_straight_to_connecting() {
        let (phase, actions) = SyncPhase::new().on_event(Event::Opened {
            authenticated: true,
        });
        assert_eq!(phase, SyncPhase::Connecting);
        assert!(actions.is_empty());
    }

    #[test]
    fn unauthenticated_without_qr_fails() {
        let (phase, _) = SyncPhase::new().on_event(Event::Opened {
            authenticated: false,
        });
        assert_eq!(phase, SyncPhase::Unauthenticated);

        let (phase, actions) = phase.on_event(Event::PairingDenied);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    #[test]
    fn pairing_counts_codes_and_regenerates() {
        let (phase, actions) = SyncPhase::Unauthenticated.on_event(Event::PairingAllowed);
        assert_eq!(actions, vec![Action::RequestPairingCode]);

        let (phase, actions) = phase.on_event(Event::PairingCodeIssued);
        assert_eq!(phase, SyncPhase::Pairing { codes_shown: 1 });
        assert_eq!(actions, vec![Action::ShowPairingCode]);

        let (phase, actions) = phase.on_event(Event::PairingCodeExpired);
        assert_eq!(actions, vec![Action::RequestPairingCode]);

        let (phase, _) = phase.on_event(Event::PairingCodeIssued);
        assert_eq!(phase, SyncPhase::Pairing { codes_shown: 2 });

        let (phase, actions) = phase.on_event(Event::Paired);
        assert_eq!(phase, SyncPhase::Connecting);
        assert!(actions.is_empty());
    }

    #[test]
    fn rejected_pairing_is_unauthenticated() {
        let (phase, actions) =
            SyncPhase::Pairing { codes_shown: 1 }.on_event(Event::PairingRejected);
        assert_eq!(phase, SyncPhase::Closed);
        assert!(!actions.contains(&Action::Finish));
    }

    #[test]
    fn connect_failure_closes_with_connection_error() {
        let (phase, actions) = SyncPhase::Connecting.on_event(Event::ConnectFailed);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    // ===========================================
    // Ingestion and Exit
    // ===========================================

    #[test]
    fn bounded_ingest_resets_idle_timer_per_message() {
        let phase = ingesting(Duration::from_millis(500));
        assert!(phase.is_ingesting());
        assert_eq!(phase.idle_window(), Some(Duration::from_millis(500)));

        let (phase, actions) = phase.on_event(Event::MessageStored);
        assert!(matches!(phase, SyncPhase::Ingesting { .. }));
        assert_eq!(actions, vec![Action::ResetIdleTimer]);
    }

    #[test]
    fn idle_elapsed_finishes_bounded_run() {
        let (phase, actions) = ingesting(Duration::from_secs(1)).on_event(Event::IdleElapsed);
        assert_eq!(phase, SyncPhase::IdleTimeout);
        assert_eq!(actions, vec![Action::Finish]);
    }

    #[test]
    fn bootstrap_with_idle_window_ignores_history_complete() {
        let (phase, actions) = ingesting(Duration::from_secs(1)).on_event(Event::HistoryComplete);
        assert!(matches!(phase, SyncPhase::Ingesting { .. }));
        assert!(actions.is_empty());
    }

    #[test]
    fn bootstrap_without_idle_window_waits_for_history_complete() {
        let phase = ingesting(Duration::ZERO);
        assert_eq!(phase.idle_window(), None);

        let (phase, actions) = phase.on_event(Event::IdleElapsed);
        assert!(matches!(phase, SyncPhase::Ingesting { .. }));
        assert!(actions.is_empty());

        let (phase, actions) = phase.on_event(Event::HistoryComplete);
        assert_eq!(phase, SyncPhase::Done);
        assert_eq!(actions, vec![Action::Finish]);
    }

    #[test]
    fn follow_never_exits_on_idle() {
        let (phase, actions) = SyncPhase::Connected.on_event(Event::IngestStarted {
            policy: ExitPolicy::for_mode(SyncMode::Follow, Duration::from_secs(1)),
        });
        assert_eq!(phase, SyncPhase::Following);
        assert!(actions.is_empty());

        let (phase, actions) = phase.on_event(Event::IdleElapsed);
        assert_eq!(phase, SyncPhase::Following);
        assert!(actions.is_empty());

        let (phase, _) = phase.on_event(Event::HistoryComplete);
        assert_eq!(phase, SyncPhase::Following);
    }

    #[test]
    fn follow_cancel_is_clean() {
        let (phase, actions) = SyncPhase::Following.on_event(Event::Cancelled);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Finish, Action::Disconnect]);
    }

    #[test]
    fn bounded_cancel_is_an_error() {
        let (phase, actions) = ingesting(Duration::from_secs(1)).on_event(Event::Cancelled);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    #[test]
    fn cancel_while_pairing_is_an_error() {
        let (_, actions) = SyncPhase::Pairing { codes_shown: 3 }.on_event(Event::Cancelled);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    #[test]
    fn store_failure_is_fatal() {
        let (phase, actions) = ingesting(Duration::from_secs(1)).on_event(Event::StoreFailed);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    #[test]
    fn stream_end_finishes_bounded_but_fails_follow() {
        let (phase, actions) = ingesting(Duration::from_secs(1)).on_event(Event::StreamEnded);
        assert_eq!(phase, SyncPhase::Done);
        assert_eq!(actions, vec![Action::Finish]);

        let (phase, actions) = SyncPhase::Following.on_event(Event::StreamEnded);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);
    }

    #[test]
    fn connection_lost_is_fatal_in_every_live_phase() {
        for phase in [
            SyncPhase::Connected,
            ingesting(Duration::from_secs(1)),
            SyncPhase::Following,
        ] {
            let (next, actions) = phase.on_event(Event::ConnectionLost);
            assert_eq!(next, SyncPhase::Closed);
            assert_eq!(actions, vec![Action::Disconnect]);
        }
    }

    // ===========================================
    // Invalid Transitions
    // ===========================================

    #[test]
    fn invalid_transitions_are_ignored() {
        let (phase, actions) = SyncPhase::Starting.on_event(Event::MessageStored);
        assert_eq!(phase, SyncPhase::Starting);
        assert!(actions.is_empty());

        let (phase, actions) = SyncPhase::Connecting.on_event(Event::PairingCodeIssued);
        assert_eq!(phase, SyncPhase::Connecting);
        assert!(actions.is_empty());
    }

    #[test]
    fn close_from_anywhere_disconnects_once() {
        let (phase, actions) = SyncPhase::Done.on_event(Event::Closed);
        assert_eq!(phase, SyncPhase::Closed);
        assert_eq!(actions, vec![Action::Disconnect]);

        let (phase, actions) = phase.on_event(Event::Closed);
        assert_eq!(phase, SyncPhase::Closed);
        assert!(actions.is_empty());
    }

    #[test]
    fn failures_disconnect_once_then_close_quietly() {
        let cases = [
            (SyncPhase::Unauthenticated, Event::PairingDenied),
            (SyncPhase::Pairing { codes_shown: 0 }, Event::PairingRejected),
            (SyncPhase::Connecting, Event::ConnectFailed),
            (SyncPhase::Connected, Event::Cancelled),
            (SyncPhase::Following, Event::StreamEnded),
        ];
        for (phase, event) in cases {
            let (closed, actions) = phase.on_event(event);
            assert_eq!(actions, vec![Action::Disconnect]);
            let (_, actions) = closed.on_event(Event::Closed);
            assert!(actions.is_empty());
        }
    }

    #[test]
    fn terminal_phases() {
        assert!(SyncPhase::Done.is_terminal());
        assert!(SyncPhase::IdleTimeout.is_terminal());
        assert!(SyncPhase::Closed.is_terminal());
        assert!(!SyncPhase::Following.is_terminal());
        assert_eq!(SyncPhase::Following.name(), "following");
    }
}

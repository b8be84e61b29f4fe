//! Events reported by a session client.

use crate::{PairingCode, StoredMessage};

/// Inbound events from a connected session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A live message arrived.
    Message(StoredMessage),
    /// A chunk of historical backfill.
    HistoryBatch(Vec<StoredMessage>),
    /// The server has no more history to send for this backfill.
    HistoryComplete,
    /// The connection dropped.
    Disconnected {
        /// Reason reported by the transport.
        reason: String,
    },
}

impl SessionEvent {
    /// Number of messages carried by this event.
    pub fn message_count(&self) -> usize {
        match self {
            Self::Message(_) => 1,
            Self::HistoryBatch(batch) => batch.len(),
            Self::HistoryComplete | Self::Disconnected { .. } => 0,
        }
    }
}

/// Events on a pairing-code stream.
///
/// A stream may yield several codes in a row (each replacing the previous
/// one on screen). It ends with `Success`, `Failed`, or `Expired`; after
/// `Expired` a new stream has to be requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A new code to show to the user.
    Code(PairingCode),
    /// The codes of this stream ran out without a scan.
    Expired,
    /// The code was scanned and credentials are stored.
    Success,
    /// The phone rejected the pairing.
    Failed(String),
}

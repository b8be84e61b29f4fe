//! Records handed from a session client to a store.

use serde::{Deserialize, Serialize};

use crate::{ChatId, MessageId};

/// A message as persisted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message identifier
    pub id: MessageId,
    /// Chat the message belongs to
    pub chat: ChatId,
    /// Sender identifier (same namespace as chat ids)
    pub sender: ChatId,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Sent by this account
    #[serde(default)]
    pub from_me: bool,
    /// Text body, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Attached media, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl StoredMessage {
    /// Build a text message.
    pub fn text(
        id: impl Into<String>,
        chat: impl Into<String>,
        sender: impl Into<String>,
        timestamp: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(id),
            chat: ChatId::new(chat),
            sender: ChatId::new(sender),
            timestamp,
            from_me: false,
            text: Some(text.into()),
            media: None,
        }
    }

    /// Attach media to this message.
    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }

    /// True if the message carries downloadable media.
    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// Pointer to media that can be fetched through the session client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Server-side path used to download the blob
    pub direct_path: String,
    /// MIME type (e.g. `image/jpeg`)
    pub mime_type: String,
    /// Size in bytes as announced by the sender
    #[serde(default)]
    pub size: u64,
}

/// A contact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact identifier
    pub id: ChatId,
    /// Display name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier
    pub id: ChatId,
    /// Group subject
    pub name: String,
    /// Member identifiers
    #[serde(default)]
    pub participants: Vec<ChatId>,
}

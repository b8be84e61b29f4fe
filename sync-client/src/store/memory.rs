//! In-memory store, for tests and embedding.

use super::{Store, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use sync_types::{ChatId, Contact, Group, MessageId, StoredMessage};

/// In-memory store.
///
/// Clones share state. Can be told to start rejecting message writes after
/// a number of successful ones.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    messages: BTreeMap<MessageId, StoredMessage>,
    contacts: HashMap<ChatId, Contact>,
    groups: HashMap<ChatId, Group>,
    media: HashMap<MessageId, Vec<u8>>,
    writes: usize,
    fail_after: Option<(usize, String)>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message write after `n` successful ones.
    pub fn fail_writes_after(&self, n: usize, error: &str) {
        self.inner.lock().unwrap().fail_after = Some((n, error.to_string()));
    }

    /// All stored messages, ordered by id.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.inner.lock().unwrap().messages.values().cloned().collect()
    }

    /// All stored contacts.
    pub fn contacts(&self) -> Vec<Contact> {
        self.inner.lock().unwrap().contacts.values().cloned().collect()
    }

    /// All stored groups.
    pub fn groups(&self) -> Vec<Group> {
        self.inner.lock().unwrap().groups.values().cloned().collect()
    }

    /// Media saved for a message.
    pub fn media_for(&self, id: &MessageId) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().media.get(id).cloned()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn store_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((limit, error)) = &inner.fail_after {
            if inner.writes >= *limit {
                return Err(StoreError::Write(error.clone()));
            }
        }
        inner.writes += 1;
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn store_contacts(&self, contacts: &[Contact]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for contact in contacts {
            inner.contacts.insert(contact.id.clone(), contact.clone());
        }
        Ok(())
    }

    async fn store_groups(&self, groups: &[Group]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for group in groups {
            inner.groups.insert(group.id.clone(), group.clone());
        }
        Ok(())
    }

    async fn store_media(&self, message: &MessageId, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.media.insert(message.clone(), bytes.to_vec());
        Ok(())
    }

    async fn message_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().unwrap().messages.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_upsert_by_id() {
        let store = MemoryStore::new();
        let msg = StoredMessage::text("m1", "c", "s", 1, "first");
        store.store_message(&msg).await.unwrap();

        let edited = StoredMessage::text("m1", "c", "s", 2, "edited");
        store.store_message(&edited).await.unwrap();

        assert_eq!(store.message_count().await.unwrap(), 1);
        assert_eq!(store.messages()[0].text.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn fail_writes_after_limit() {
        let store = MemoryStore::new();
        store.fail_writes_after(1, "disk full");

        store
            .store_message(&StoredMessage::text("a", "c", "s", 1, "x"))
            .await
            .unwrap();
        let result = store
            .store_message(&StoredMessage::text("b", "c", "s", 2, "y"))
            .await;
        assert!(matches!(result, Err(StoreError::Write(_))));
        assert_eq!(store.message_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn contacts_groups_and_media() {
        let store = MemoryStore::new();
        store
            .store_contacts(&[Contact {
                id: ChatId::new("alice@s"),
                name: Some("Alice".into()),
            }])
            .await
            .unwrap();
        store
            .store_groups(&[Group {
                id: ChatId::new("g@g.us"),
                name: "Team".into(),
                participants: vec![ChatId::new("alice@s")],
            }])
            .await
            .unwrap();
        store
            .store_media(&MessageId::new("m1"), &[9, 9])
            .await
            .unwrap();

        assert_eq!(store.contacts().len(), 1);
        assert_eq!(store.groups()[0].name, "Team");
        assert_eq!(store.media_for(&MessageId::new("m1")), Some(vec![9, 9]));
    }
}

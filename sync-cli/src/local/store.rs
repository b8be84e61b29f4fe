//! File store.
//!
//! Messages are appended to `messages.jsonl` (last line for an id wins);
//! contacts and groups are merged by id into pretty JSON files; media bytes
//! go to one file per message.
//!
//! Nothing is read until the first store operation. Bytes after the last
//! newline of the message log are an interrupted append: they are skipped
//! when reading and cut off before the next write.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use sync_client::{Store, StoreError};
use sync_types::{ChatId, Contact, Group, MessageId, StoredMessage};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};

use super::{file_name, read_json};

const STORE_DIR: &str = "store";
const MESSAGES_FILE: &str = "messages.jsonl";
const CONTACTS_FILE: &str = "contacts.json";
const GROUPS_FILE: &str = "groups.json";
const MEDIA_DIR: &str = "media";

/// Store under `<data-dir>/store`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    log: OnceCell<Mutex<MessageLog>>,
    // Serializes read-modify-write of the contact and group files.
    lists: Mutex<()>,
}

/// What is known about `messages.jsonl` once it has been read.
#[derive(Debug)]
struct MessageLog {
    ids: HashSet<MessageId>,
    // Length of the intact prefix when the file ends in a partial line.
    torn_at: Option<u64>,
}

impl FileStore {
    /// Store of a data directory. Touches nothing until first use.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(STORE_DIR),
            log: OnceCell::new(),
            lists: Mutex::new(()),
        }
    }

    /// Messages as persisted, in file order, later lines replacing earlier ones.
    #[cfg(test)]
    pub async fn messages(&self) -> Result<Vec<StoredMessage>, StoreError> {
        let Some(contents) = read_log(&self.root.join(MESSAGES_FILE)).await? else {
            return Ok(Vec::new());
        };
        let (complete, _) = split_torn(&contents);
        let mut by_id: BTreeMap<MessageId, (usize, StoredMessage)> = BTreeMap::new();
        for (line_no, line) in records(complete) {
            let message: StoredMessage = parse_record(line_no, line)?;
            let first_seen = by_id.get(&message.id).map_or(line_no, |(seen, _)| *seen);
            by_id.insert(message.id.clone(), (first_seen, message));
        }
        let mut messages: Vec<_> = by_id.into_values().collect();
        messages.sort_by_key(|(line_no, _)| *line_no);
        Ok(messages.into_iter().map(|(_, message)| message).collect())
    }

    async fn log(&self) -> Result<&Mutex<MessageLog>, StoreError> {
        self.log
            .get_or_try_init(|| async {
                MessageLog::load(&self.root.join(MESSAGES_FILE))
                    .await
                    .map(Mutex::new)
            })
            .await
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", dir.display(), e)))
    }

    async fn merge<T, K>(&self, file: &str, items: &[T], key: K) -> Result<usize, StoreError>
    where
        T: Clone + serde::Serialize + serde::de::DeserializeOwned,
        K: Fn(&T) -> ChatId,
    {
        let _guard = self.lists.lock().await;
        self.ensure_dir(&self.root).await?;
        let path = self.root.join(file);
        let existing: Vec<T> = read_json(&path)
            .await
            .map_err(StoreError::Corrupt)?
            .unwrap_or_default();

        let mut merged: BTreeMap<ChatId, T> =
            existing.into_iter().map(|item| (key(&item), item)).collect();
        for item in items {
            merged.insert(key(item), item.clone());
        }

        let values: Vec<&T> = merged.values().collect();
        let contents =
            serde_json::to_vec_pretty(&values).map_err(|e| StoreError::Write(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", path.display(), e)))?;
        Ok(merged.len())
    }
}

impl MessageLog {
    async fn load(path: &Path) -> Result<Self, StoreError> {
        #[derive(serde::Deserialize)]
        struct IdOnly {
            id: MessageId,
        }

        let Some(contents) = read_log(path).await? else {
            return Ok(Self {
                ids: HashSet::new(),
                torn_at: None,
            });
        };
        let (complete, tail) = split_torn(&contents);
        let ids = records(complete)
            .map(|(line_no, line)| parse_record::<IdOnly>(line_no, line).map(|r| r.id))
            .collect::<Result<HashSet<_>, _>>()?;

        let torn_at = if tail.is_empty() {
            None
        } else {
            tracing::warn!(
                path = %path.display(),
                bytes = tail.len(),
                "message log ends in a partial record, ignoring it"
            );
            Some(complete.len() as u64)
        };
        tracing::debug!(messages = ids.len(), "message log loaded");
        Ok(Self { ids, torn_at })
    }
}

#[async_trait]
impl Store for FileStore {
    async fn store_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| StoreError::Write(e.to_string()))?;
        line.push('\n');

        let mut log = self.log().await?.lock().await;
        self.ensure_dir(&self.root).await?;
        let path = self.root.join(MESSAGES_FILE);
        let write_err = |e: std::io::Error| StoreError::Write(format!("{}: {}", path.display(), e));

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        if let Some(len) = log.torn_at {
            file.set_len(len).await.map_err(write_err)?;
            tracing::info!(path = %path.display(), "partial record removed from message log");
            log.torn_at = None;
        }
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        log.ids.insert(message.id.clone());
        Ok(())
    }

    async fn store_contacts(&self, contacts: &[Contact]) -> Result<(), StoreError> {
        let total = self
            .merge(CONTACTS_FILE, contacts, |c: &Contact| c.id.clone())
            .await?;
        tracing::debug!(received = contacts.len(), total, "contacts stored");
        Ok(())
    }

    async fn store_groups(&self, groups: &[Group]) -> Result<(), StoreError> {
        let total = self
            .merge(GROUPS_FILE, groups, |g: &Group| g.id.clone())
            .await?;
        tracing::debug!(received = groups.len(), total, "groups stored");
        Ok(())
    }

    async fn store_media(&self, message: &MessageId, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.root.join(MEDIA_DIR);
        self.ensure_dir(&dir).await?;
        let path = dir.join(file_name(message.as_str()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", path.display(), e)))
    }

    async fn message_count(&self) -> Result<u64, StoreError> {
        Ok(self.log().await?.lock().await.ids.len() as u64)
    }
}

async fn read_log(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Read(format!("{}: {}", path.display(), e))),
    }
}

/// Split the log into newline-terminated records and a trailing partial line.
fn split_torn(contents: &[u8]) -> (&[u8], &[u8]) {
    match contents.iter().rposition(|&b| b == b'\n') {
        Some(last) => contents.split_at(last + 1),
        None => contents.split_at(0),
    }
}

/// Non-blank lines with their 1-based line numbers.
fn records(complete: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    complete
        .split(|&b| b == b'\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
}

fn parse_record<T: serde::de::DeserializeOwned>(
    line_no: usize,
    line: &[u8],
) -> Result<T, StoreError> {
    serde_json::from_slice(line)
        .map_err(|e| StoreError::Corrupt(format!("{} line {}: {}", MESSAGES_FILE, line_no, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn log_path(dir: &Path) -> PathBuf {
        dir.join(STORE_DIR).join(MESSAGES_FILE)
    }

    #[tokio::test]
    async fn messages_append_and_dedupe_on_reopen() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .store_message(&StoredMessage::text("m1", "c@s", "a@s", 1, "first"))
            .await
            .unwrap();
        store
            .store_message(&StoredMessage::text("m2", "c@s", "a@s", 2, "second"))
            .await
            .unwrap();
        store
            .store_message(&StoredMessage::text("m1", "c@s", "a@s", 3, "edited"))
            .await
            .unwrap();
        assert_eq!(store.message_count().await.unwrap(), 2);

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.message_count().await.unwrap(), 2);
        let messages = reopened.messages().await.unwrap();
        assert_eq!(messages[0].text.as_deref(), Some("edited"));
        assert_eq!(messages[1].id, MessageId::new("m2"));
    }

    #[tokio::test]
    async fn new_store_touches_nothing() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.message_count().await.unwrap(), 0);
        assert!(!dir.path().join(STORE_DIR).exists());
    }

    #[tokio::test]
    async fn partial_last_record_is_skipped_then_cut_on_write() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STORE_DIR)).unwrap();
        let intact = serde_json::to_string(&StoredMessage::text("m1", "c@s", "a@s", 1, "hi")).unwrap();
        std::fs::write(
            log_path(dir.path()),
            format!("{}\n{{\"id\":\"m2\",\"chat\":\"c@", intact),
        )
        .unwrap();

        let store = FileStore::new(dir.path());
        assert_eq!(store.message_count().await.unwrap(), 1);

        store
            .store_message(&StoredMessage::text("m3", "c@s", "a@s", 3, "after"))
            .await
            .unwrap();
        let contents = std::fs::read_to_string(log_path(dir.path())).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));

        let reopened = FileStore::new(dir.path());
        let ids: Vec<_> = reopened
            .messages()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![MessageId::new("m1"), MessageId::new("m3")]);
    }

    #[tokio::test]
    async fn contacts_merge_by_id() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let alice = Contact {
            id: ChatId::new("alice@s"),
            name: None,
        };
        store.store_contacts(&[alice]).await.unwrap();
        store
            .store_contacts(&[
                Contact {
                    id: ChatId::new("alice@s"),
                    name: Some("Alice".into()),
                },
                Contact {
                    id: ChatId::new("bob@s"),
                    name: None,
                },
            ])
            .await
            .unwrap();

        let saved: Vec<Contact> = serde_json::from_slice(
            &std::fs::read(dir.path().join(STORE_DIR).join(CONTACTS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn media_written_per_message() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .store_media(&MessageId::new("3EB0/42"), b"jpeg")
            .await
            .unwrap();
        let path = dir.path().join(STORE_DIR).join(MEDIA_DIR).join("3EB0_42");
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn corrupt_middle_record_fails_first_use() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STORE_DIR)).unwrap();
        std::fs::write(log_path(dir.path()), "{oops\n{\"id\":\"m2\"}\n").unwrap();

        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.message_count().await,
            Err(StoreError::Corrupt(_))
        ));
    }
}

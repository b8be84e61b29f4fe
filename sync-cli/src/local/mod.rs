//! File-backed collaborators for the command surface.
//!
//! - [`LocalSession`]: a session client keeping credentials in
//!   `session.json` and replaying history from `remote/` fixture files
//! - [`FileStore`]: a store writing messages, contacts, groups and media
//!   under `store/`
//!
//! Data directory layout:
//!
//! ```text
//! <data-dir>/
//! ├── config.toml          optional
//! ├── LOCK                 while a command holds the directory
//! ├── session.json         credentials (0600)
//! ├── remote/              what the session replays
//! │   ├── history.json
//! │   ├── contacts.json
//! │   ├── groups.json
//! │   └── media/<file>
//! └── store/
//!     ├── messages.jsonl
//!     ├── contacts.json
//!     ├── groups.json
//!     └── media/<message-id>
//! ```

mod session;
mod store;

pub use session::{LocalSession, SessionState, SESSION_FILE};
pub use store::FileStore;

use std::path::Path;

/// Read a JSON fixture, or `None` if the file does not exist.
async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| format!("{}: {}", path.display(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("{}: {}", path.display(), e)),
    }
}

/// Turn an id into a safe file name.
fn file_name(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_flattened() {
        assert_eq!(file_name("3EB0/../x@s"), "3EB0_.._x_s");
        assert_eq!(file_name("ABC-123_z.jpg"), "ABC-123_z.jpg");
    }
}

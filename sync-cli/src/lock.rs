//! Exclusive lock on a data directory.
//!
//! Only one `auth` or `auth logout` may drive a data directory at a time.
//! The lock is a `LOCK` file created with `create_new`, holding the owner's
//! pid, and removed when the guard drops.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lock file name inside the data directory.
pub const LOCK_FILE: &str = "LOCK";

/// Lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("data directory {dir} is in use by another linksync process (pid {owner}); remove {dir}/LOCK if that process is gone")]
    Held {
        /// Locked directory.
        dir: PathBuf,
        /// Pid recorded in the lock file.
        owner: String,
    },
    /// The lock file could not be created.
    #[error("failed to create lock file {path}: {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Held lock. Released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    /// Take the lock or fail immediately.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                tracing::debug!(path = %path.display(), "data directory locked");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let owner = std::fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                Err(LockError::Held {
                    dir: data_dir.to_path_buf(),
                    owner,
                })
            }
            Err(source) => Err(LockError::Io { path, source }),
        }
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

//! Sync modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// How a sync run ingests and when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Backfill history, then stop once idle.
    #[default]
    Bootstrap,
    /// Backfill, then keep following live events until cancelled.
    Follow,
    /// Backfill and stop at the first quiet period.
    Once,
}

impl SyncMode {
    /// True for modes that end on their own (idle or history complete).
    pub fn is_bounded(self) -> bool {
        !matches!(self, Self::Follow)
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Follow => "follow",
            Self::Once => "once",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bootstrap" => Ok(Self::Bootstrap),
            "follow" => Ok(Self::Follow),
            "once" => Ok(Self::Once),
            other => Err(TypesError::InvalidMode(other.to_string())),
        }
    }
}

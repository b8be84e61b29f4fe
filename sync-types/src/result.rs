//! The outcome of a sync run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Summary returned by a successful sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Messages the store accepted during this run.
    pub messages_stored: u64,
    /// Non-fatal side-task failures (refresh, media).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SyncWarning>,
}

impl SyncResult {
    /// A result with no warnings.
    pub fn new(messages_stored: u64) -> Self {
        Self {
            messages_stored,
            warnings: Vec::new(),
        }
    }

    /// True if any side task failed.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Which side task produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Contact list refresh
    RefreshContacts,
    /// Group list refresh
    RefreshGroups,
    /// Media download
    Media,
}

impl WarningKind {
    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefreshContacts => "refresh_contacts",
            Self::RefreshGroups => "refresh_groups",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarningKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refresh_contacts" => Ok(Self::RefreshContacts),
            "refresh_groups" => Ok(Self::RefreshGroups),
            "media" => Ok(Self::Media),
            other => Err(TypesError::InvalidWarningKind(other.to_string())),
        }
    }
}

/// A best-effort failure that did not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWarning {
    /// Source of the failure
    pub kind: WarningKind,
    /// Human-readable cause
    pub message: String,
}

impl SyncWarning {
    /// Create a warning.
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_json_omits_empty_warnings() {
        let json = serde_json::to_string(&SyncResult::new(7)).unwrap();
        assert_eq!(json, r#"{"messages_stored":7}"#);
    }

    #[test]
    fn warning_display() {
        let w = SyncWarning::new(WarningKind::Media, "404 from media host");
        assert_eq!(w.to_string(), "media: 404 from media host");
    }

    #[test]
    fn warning_kind_parse() {
        assert_eq!(
            "refresh_groups".parse::<WarningKind>().unwrap(),
            WarningKind::RefreshGroups
        );
        assert!("other".parse::<WarningKind>().is_err());
    }

    #[test]
    fn has_warnings() {
        let mut result = SyncResult::new(0);
        assert!(!result.has_warnings());
        result
            .warnings
            .push(SyncWarning::new(WarningKind::RefreshContacts, "timeout"));
        assert!(result.has_warnings());
    }
}

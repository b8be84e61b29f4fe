//! Command output: plain text or one JSON object on stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use sync_types::SyncWarning;

/// Result of `auth`.
#[derive(Debug, Serialize)]
pub struct AuthReport {
    /// Always true on success.
    pub authenticated: bool,
    /// Messages stored during the run.
    pub messages_stored: u64,
    /// Side-task failures, omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SyncWarning>,
}

/// Result of `auth status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Whether credentials exist.
    pub authenticated: bool,
}

/// Result of `auth logout`.
#[derive(Debug, Serialize)]
pub struct LogoutReport {
    /// Always true on success.
    pub logged_out: bool,
}

/// Write a value as a single JSON line to stdout.
pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("Failed to encode JSON output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::WarningKind;

    #[test]
    fn auth_report_omits_empty_warnings() {
        let report = AuthReport {
            authenticated: true,
            messages_stored: 7,
            warnings: vec![],
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"authenticated":true,"messages_stored":7}"#
        );
    }

    #[test]
    fn auth_report_lists_warnings() {
        let report = AuthReport {
            authenticated: true,
            messages_stored: 1,
            warnings: vec![SyncWarning::new(WarningKind::Media, "404")],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""warnings":[{"kind":"media","message":"404"}]"#));
    }

    #[test]
    fn status_and_logout_shapes() {
        assert_eq!(
            serde_json::to_string(&StatusReport {
                authenticated: false
            })
            .unwrap(),
            r#"{"authenticated":false}"#
        );
        assert_eq!(
            serde_json::to_string(&LogoutReport { logged_out: true }).unwrap(),
            r#"{"logged_out":true}"#
        );
    }
}

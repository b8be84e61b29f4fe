//! Error types for linksync-types.

use thiserror::Error;

/// Errors produced while parsing linksync types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Unknown sync mode name
    #[error("invalid sync mode: {0} (expected bootstrap, follow or once)")]
    InvalidMode(String),

    /// Unknown warning kind name
    #[error("invalid warning kind: {0}")]
    InvalidWarningKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::InvalidMode("sideways".into());
        assert_eq!(
            err.to_string(),
            "invalid sync mode: sideways (expected bootstrap, follow or once)"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}

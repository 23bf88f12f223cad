//! Error types for convsync-types.

use thiserror::Error;

/// Errors raised while parsing wire strings into typed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Unknown message status string.
    #[error("unknown message status: {0}")]
    UnknownStatus(String),

    /// Unknown media status string.
    #[error("unknown media status: {0}")]
    UnknownMediaStatus(String),

    /// Unknown conversation category string.
    #[error("unknown conversation category: {0}")]
    UnknownConversationKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::UnknownStatus("LOST".into());
        assert_eq!(err.to_string(), "unknown message status: LOST");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ParseError>();
    }
}

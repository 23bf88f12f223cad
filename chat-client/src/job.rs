//! Retryable units of work.
//!
//! A job declares what connectivity it needs and exposes one action. It
//! never retries itself; [`crate::scheduler::JobScheduler`] does.

use async_trait::async_trait;
use chat_core::{classify_http_status, ErrorClass};
use thiserror::Error;

/// Job action errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Network-layer failure (timeout, reset, unreachable).
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with an error status.
    #[error("server responded with status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The payload could not be built or was rejected as malformed.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The operation was permanently refused.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl JobError {
    /// Retry class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Transient,
            Self::Http { status } => classify_http_status(*status),
            Self::Malformed(_) | Self::Rejected(_) => ErrorClass::Fatal,
        }
    }
}

/// A retryable unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identity used for de-duplication.
    fn id(&self) -> String;

    /// Wait for network reachability before running.
    fn requires_network(&self) -> bool {
        true
    }

    /// Wait for the message socket before running.
    fn requires_socket(&self) -> bool {
        false
    }

    /// Perform the work once.
    async fn run(&self) -> Result<(), JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        assert_eq!(JobError::Network("reset".into()).class(), ErrorClass::Transient);
    }

    #[test]
    fn http_errors_classify_by_status() {
        assert_eq!(JobError::Http { status: 503 }.class(), ErrorClass::Transient);
        assert_eq!(JobError::Http { status: 429 }.class(), ErrorClass::Transient);
        assert_eq!(JobError::Http { status: 403 }.class(), ErrorClass::Fatal);
    }

    #[test]
    fn malformed_and_rejected_are_fatal() {
        assert_eq!(JobError::Malformed("bad json".into()).class(), ErrorClass::Fatal);
        assert_eq!(JobError::Rejected("blocked".into()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn error_messages() {
        assert_eq!(JobError::Http { status: 500 }.to_string(), "server responded with status 500");
    }
}

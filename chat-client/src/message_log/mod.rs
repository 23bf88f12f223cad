//! Read-only access to persisted messages.
//!
//! The store never writes to the log. Pages are always returned in
//! ascending `(created_at, sequence_order)` order.

mod mock;

pub use mock::MockMessageLog;

use async_trait::async_trait;
use chat_core::PageRequest;
use chat_types::{ConversationId, MessageId, MessageRecord};
use thiserror::Error;

/// Message log errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// The backing storage could not be read.
    #[error("message log unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Offending message id.
        id: MessageId,
        /// What was wrong.
        reason: String,
    },
}

/// Query interface over persisted messages.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Up to `count` records for `request`, ascending.
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        request: &PageRequest,
        count: usize,
    ) -> Result<Vec<MessageRecord>, LogError>;

    /// The current persisted version of one record.
    async fn fetch_full_record(&self, id: &MessageId) -> Result<Option<MessageRecord>, LogError>;

    /// Oldest unread message in `conversation`.
    async fn first_unread_id(&self, conversation: &ConversationId) -> Result<Option<MessageId>, LogError>;

    /// Number of unread messages in `conversation`.
    async fn unread_count(&self, conversation: &ConversationId) -> Result<u64, LogError>;
}

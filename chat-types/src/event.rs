//! Change events carried on the change bus.

use crate::conversation::ConversationMeta;
use crate::ids::{ConversationId, MessageId};
use crate::message::{MediaStatus, MessageRecord, MessageStatus};

/// A mutation notification for one conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Discard all cached state and re-initialize at the current anchor.
    Reload,
    /// Replace conversation metadata; buckets are untouched.
    ReplaceConversationMeta(ConversationMeta),
    /// Update only the group icon.
    UpdateGroupIcon {
        /// New icon URL.
        icon_url: Option<String>,
    },
    /// A new message arrived or was sent.
    AddMessage(MessageRecord),
    /// Delivery status changed.
    UpdateStatus {
        /// Message id.
        id: MessageId,
        /// New status.
        status: MessageStatus,
    },
    /// Attachment status changed.
    UpdateMediaStatus {
        /// Message id.
        id: MessageId,
        /// New media status.
        status: MediaStatus,
    },
    /// Attachment upload/download progress.
    UpdateProgress {
        /// Message id.
        id: MessageId,
        /// Progress in `0.0..=1.0`.
        progress: f64,
    },
    /// The persisted record changed; re-fetch it from the message log.
    UpdateFullRecord {
        /// Message id.
        id: MessageId,
    },
}

impl ChangeEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::ReplaceConversationMeta(_) => "replace_conversation_meta",
            Self::UpdateGroupIcon { .. } => "update_group_icon",
            Self::AddMessage(_) => "add_message",
            Self::UpdateStatus { .. } => "update_status",
            Self::UpdateMediaStatus { .. } => "update_media_status",
            Self::UpdateProgress { .. } => "update_progress",
            Self::UpdateFullRecord { .. } => "update_full_record",
        }
    }
}

/// A change event addressed to a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationChange {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// The event.
    pub event: ChangeEvent,
}

impl ConversationChange {
    /// Address `event` to `conversation_id`.
    pub fn new(conversation_id: ConversationId, event: ChangeEvent) -> Self {
        Self {
            conversation_id,
            event,
        }
    }
}

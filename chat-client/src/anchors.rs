//! Per-conversation scroll positions that outlive store instances.

use chat_types::{ConversationId, MessageId};
use dashmap::DashMap;
use std::sync::Arc;

/// Last viewed position in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollAnchor {
    /// Message at the anchor.
    pub message_id: MessageId,
    /// Pixel offset of the message from the top of the viewport.
    pub pixel_offset: f64,
}

impl ScrollAnchor {
    /// Anchor at `message_id` with `pixel_offset`.
    pub fn new(message_id: MessageId, pixel_offset: f64) -> Self {
        Self {
            message_id,
            pixel_offset,
        }
    }
}

/// Process-wide scroll anchor map, written by the display layer and read by
/// stores at initialization. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ScrollAnchors {
    inner: Arc<DashMap<ConversationId, ScrollAnchor>>,
}

impl ScrollAnchors {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor for `conversation`.
    pub fn get(&self, conversation: &ConversationId) -> Option<ScrollAnchor> {
        self.inner.get(conversation).map(|entry| entry.value().clone())
    }

    /// Store the anchor for `conversation`.
    pub fn set(&self, conversation: ConversationId, anchor: ScrollAnchor) {
        self.inner.insert(conversation, anchor);
    }

    /// Forget the anchor for `conversation`.
    pub fn remove(&self, conversation: &ConversationId) -> Option<ScrollAnchor> {
        self.inner.remove(conversation).map(|(_, anchor)| anchor)
    }

    /// Number of stored anchors.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// No anchors stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

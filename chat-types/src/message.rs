//! Message records and their status enums.

use crate::error::ParseError;
use crate::ids::{ConversationId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Queued locally, not yet accepted by the server.
    Sending,
    /// Accepted by the server.
    Sent,
    /// Delivered to the recipient device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Permanently failed (rendered distinctly, never retried by the store).
    Failed,
}

impl MessageStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENDING" => Ok(Self::Sending),
            "SENT" => Ok(Self::Sent),
            "DELIVERED" => Ok(Self::Delivered),
            "READ" => Ok(Self::Read),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer status of a message's attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    /// Transfer not started or in progress.
    Pending,
    /// Transfer finished.
    Done,
    /// Transfer cancelled by the user.
    Canceled,
    /// Attachment expired on the server.
    Expired,
}

impl MediaStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl FromStr for MediaStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "DONE" => Ok(Self::Done),
            "CANCELED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(ParseError::UnknownMediaStatus(other.to_string())),
        }
    }
}

/// Message category.
///
/// Wire categories carry a transport prefix (`SIGNAL_TEXT`, `PLAIN_IMAGE`);
/// parsing keys on the suffix so both prefixes map to the same variant.
/// Unrecognised categories are preserved verbatim in [`MessageCategory::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageCategory {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Voice message.
    Audio,
    /// Generic file attachment.
    Data,
    /// Sticker.
    Sticker,
    /// Shared contact card.
    Contact,
    /// App card.
    AppCard,
    /// Group of app buttons.
    AppButtonGroup,
    /// Conversation system notice (member joined, renamed, ...).
    SystemConversation,
    /// Account snapshot (transfer) notice.
    SystemAccountSnapshot,
    /// Synthesized "unread messages" divider.
    UnreadDivider,
    /// Synthesized end-to-end encryption hint shown at the start of history.
    EncryptionHint,
    /// Any category this build does not know about.
    Other(String),
}

impl MessageCategory {
    /// Canonical wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "SIGNAL_TEXT",
            Self::Image => "SIGNAL_IMAGE",
            Self::Video => "SIGNAL_VIDEO",
            Self::Audio => "SIGNAL_AUDIO",
            Self::Data => "SIGNAL_DATA",
            Self::Sticker => "SIGNAL_STICKER",
            Self::Contact => "SIGNAL_CONTACT",
            Self::AppCard => "APP_CARD",
            Self::AppButtonGroup => "APP_BUTTON_GROUP",
            Self::SystemConversation => "SYSTEM_CONVERSATION",
            Self::SystemAccountSnapshot => "SYSTEM_ACCOUNT_SNAPSHOT",
            Self::UnreadDivider => "EXT_UNREAD",
            Self::EncryptionHint => "EXT_ENCRYPTION",
            Self::Other(raw) => raw,
        }
    }

    /// Locally synthesized row, never persisted.
    pub fn is_pseudo(&self) -> bool {
        matches!(self, Self::UnreadDivider | Self::EncryptionHint)
    }

    /// System notice, not authored by a conversation member.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::SystemConversation | Self::SystemAccountSnapshot)
    }

    /// Whether the category carries a downloadable attachment.
    pub fn has_attachment(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio | Self::Data)
    }
}

impl From<&str> for MessageCategory {
    fn from(raw: &str) -> Self {
        match raw {
            "APP_CARD" => return Self::AppCard,
            "APP_BUTTON_GROUP" => return Self::AppButtonGroup,
            "SYSTEM_CONVERSATION" => return Self::SystemConversation,
            "SYSTEM_ACCOUNT_SNAPSHOT" => return Self::SystemAccountSnapshot,
            "EXT_UNREAD" => return Self::UnreadDivider,
            "EXT_ENCRYPTION" => return Self::EncryptionHint,
            _ => {}
        }
        let suffixes = [
            ("_TEXT", Self::Text),
            ("_IMAGE", Self::Image),
            ("_VIDEO", Self::Video),
            ("_AUDIO", Self::Audio),
            ("_DATA", Self::Data),
            ("_STICKER", Self::Sticker),
            ("_CONTACT", Self::Contact),
        ];
        for (suffix, category) in suffixes {
            if raw.ends_with(suffix) {
                return category;
            }
        }
        Self::Other(raw.to_string())
    }
}

impl From<String> for MessageCategory {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<MessageCategory> for String {
    fn from(category: MessageCategory) -> Self {
        category.as_str().to_string()
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendering-ready message row.
///
/// Everything except `status`, `media_status` and `media_progress` is
/// immutable once the record has been placed in a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message id.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author of the message ([`UserId::nobody`] for pseudo-records).
    pub author_id: UserId,
    /// Creation time (server clock, UTC).
    pub created_at: DateTime<Utc>,
    /// Server-assigned order; tie-breaker for equal `created_at`.
    pub sequence_order: i64,
    /// Category.
    pub category: MessageCategory,
    /// Delivery status.
    pub status: MessageStatus,
    /// Attachment transfer status, if the message has an attachment.
    pub media_status: Option<MediaStatus>,
    /// Attachment transfer progress in `0.0..=1.0`.
    pub media_progress: Option<f64>,
    /// Quoted message, if this is a reply.
    pub quote_id: Option<MessageId>,
    /// Text content or serialized payload.
    pub content: Option<String>,
}

impl MessageRecord {
    /// Create a sent text-less record with the given identity and time.
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        author_id: UserId,
        created_at: DateTime<Utc>,
        category: MessageCategory,
    ) -> Self {
        Self {
            id,
            conversation_id,
            author_id,
            created_at,
            sequence_order: created_at.timestamp_millis(),
            category,
            status: MessageStatus::Sent,
            media_status: None,
            media_progress: None,
            quote_id: None,
            content: None,
        }
    }

    /// Set the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the delivery status.
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    /// Quote another message.
    pub fn with_quote(mut self, quote_id: MessageId) -> Self {
        self.quote_id = Some(quote_id);
        self
    }

    /// A new text message written by `author`, waiting to be sent.
    pub fn outgoing_text(
        conversation_id: ConversationId,
        author: UserId,
        content: impl Into<String>,
        quote_id: Option<MessageId>,
    ) -> Self {
        let record = Self::new(MessageId::new(), conversation_id, author, Utc::now(), MessageCategory::Text)
            .with_content(content)
            .with_status(MessageStatus::Sending);
        match quote_id {
            Some(quote_id) => record.with_quote(quote_id),
            None => record,
        }
    }

    /// Set the server sequence order.
    pub fn with_sequence(mut self, sequence_order: i64) -> Self {
        self.sequence_order = sequence_order;
        self
    }

    /// Synthesize the one-time "unread messages" divider placed before `created_at`.
    pub fn unread_divider(conversation_id: ConversationId, created_at: DateTime<Utc>) -> Self {
        Self::new(
            MessageId::new(),
            conversation_id,
            UserId::nobody(),
            created_at,
            MessageCategory::UnreadDivider,
        )
        .with_status(MessageStatus::Read)
    }

    /// Synthesize the encryption hint shown at the very start of history.
    pub fn encryption_hint(conversation_id: ConversationId, created_at: DateTime<Utc>) -> Self {
        Self::new(
            MessageId::new(),
            conversation_id,
            UserId::nobody(),
            created_at,
            MessageCategory::EncryptionHint,
        )
        .with_status(MessageStatus::Read)
    }

    /// Locally synthesized row.
    pub fn is_pseudo(&self) -> bool {
        self.category.is_pseudo()
    }

    /// System notice.
    pub fn is_system(&self) -> bool {
        self.category.is_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_parses_wire_strings() {
        assert_eq!("DELIVERED".parse::<MessageStatus>(), Ok(MessageStatus::Delivered));
        assert_eq!(MessageStatus::Failed.as_str(), "FAILED");
        assert!("delivered".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn media_status_rejects_unknown() {
        let err = "GONE".parse::<MediaStatus>().unwrap_err();
        assert_eq!(err, ParseError::UnknownMediaStatus("GONE".into()));
    }

    #[test]
    fn category_parses_by_suffix() {
        assert_eq!(MessageCategory::from("PLAIN_TEXT"), MessageCategory::Text);
        assert_eq!(MessageCategory::from("SIGNAL_VIDEO"), MessageCategory::Video);
        assert_eq!(MessageCategory::from("EXT_UNREAD"), MessageCategory::UnreadDivider);
        assert_eq!(
            MessageCategory::from("SIGNAL_LOCATION"),
            MessageCategory::Other("SIGNAL_LOCATION".into())
        );
    }

    #[test]
    fn category_serializes_as_wire_string() {
        let json = serde_json::to_string(&MessageCategory::SystemConversation).unwrap();
        assert_eq!(json, "\"SYSTEM_CONVERSATION\"");
        let back: MessageCategory = serde_json::from_str("\"PLAIN_STICKER\"").unwrap();
        assert_eq!(back, MessageCategory::Sticker);
    }

    #[test]
    fn outgoing_text_is_pending_and_fresh() {
        let quoted = MessageId::from("m1");
        let a = MessageRecord::outgoing_text(
            ConversationId::from("c1"),
            UserId::from("me"),
            "hello",
            Some(quoted.clone()),
        );
        let b = MessageRecord::outgoing_text(ConversationId::from("c1"), UserId::from("me"), "again", None);

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, MessageStatus::Sending);
        assert_eq!(a.category, MessageCategory::Text);
        assert_eq!(a.author_id, UserId::from("me"));
        assert_eq!(a.content.as_deref(), Some("hello"));
        assert_eq!(a.quote_id, Some(quoted));
        assert_eq!(b.quote_id, None);
    }

    #[test]
    fn pseudo_records_have_no_author() {
        let conv = ConversationId::from("c");
        let hint = MessageRecord::encryption_hint(conv.clone(), at(10));
        let divider = MessageRecord::unread_divider(conv, at(10));
        assert!(hint.is_pseudo());
        assert!(divider.is_pseudo());
        assert!(hint.author_id.is_nobody());
        assert_ne!(hint.id, divider.id);
    }

    #[test]
    fn system_and_pseudo_are_distinct() {
        assert!(MessageCategory::SystemConversation.is_system());
        assert!(!MessageCategory::SystemConversation.is_pseudo());
        assert!(!MessageCategory::EncryptionHint.is_system());
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = MessageRecord::new(
            MessageId::from("m1"),
            ConversationId::from("c1"),
            UserId::from("alice"),
            at(1_700_000_000),
            MessageCategory::Text,
        )
        .with_content("hello");
        let json = serde_json::to_string(&record).unwrap();
        let back: MessageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

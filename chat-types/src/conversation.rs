//! Conversation-level metadata.

use crate::error::ParseError;
use crate::ids::{ConversationId, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    /// One-to-one conversation.
    Contact,
    /// Group conversation.
    Group,
}

impl FromStr for ConversationKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTACT" => Ok(Self::Contact),
            "GROUP" => Ok(Self::Group),
            other => Err(ParseError::UnknownConversationKind(other.to_string())),
        }
    }
}

/// Conversation fields that never affect bucket layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Contact or group.
    pub kind: ConversationKind,
    /// Display name.
    pub name: String,
    /// Group icon, if any.
    pub icon_url: Option<String>,
    /// The other party of a contact conversation.
    pub owner_id: Option<UserId>,
    /// Whether the other party is a bot (bots get no encryption hint).
    pub owner_is_bot: bool,
}

impl ConversationMeta {
    /// Metadata for a group conversation.
    pub fn group(conversation_id: ConversationId, name: impl Into<String>) -> Self {
        Self {
            conversation_id,
            kind: ConversationKind::Group,
            name: name.into(),
            icon_url: None,
            owner_id: None,
            owner_is_bot: false,
        }
    }

    /// Metadata for a one-to-one conversation with `owner`.
    pub fn contact(conversation_id: ConversationId, owner: UserId, name: impl Into<String>) -> Self {
        Self {
            conversation_id,
            kind: ConversationKind::Contact,
            name: name.into(),
            icon_url: None,
            owner_id: Some(owner),
            owner_is_bot: false,
        }
    }

    /// Mark the other party as a bot.
    pub fn with_bot_owner(mut self) -> Self {
        self.owner_is_bot = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses() {
        assert_eq!("GROUP".parse::<ConversationKind>(), Ok(ConversationKind::Group));
        assert!("CHANNEL".parse::<ConversationKind>().is_err());
    }

    #[test]
    fn contact_has_owner() {
        let meta = ConversationMeta::contact(ConversationId::from("c"), UserId::from("bob"), "Bob");
        assert_eq!(meta.kind, ConversationKind::Contact);
        assert_eq!(meta.owner_id, Some(UserId::from("bob")));
        assert!(!meta.owner_is_bot);
        assert!(meta.with_bot_owner().owner_is_bot);
    }
}

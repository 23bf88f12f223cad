//! Grouping and boundary style flags.
//!
//! Every mutation path (initial build, pagination merge, real-time insert,
//! removal) calls [`compute_style`] with the record's immediate neighbours
//! inside its bucket. There is no other place flags are derived.

use chat_types::{ConversationKind, MessageCategory, MessageRecord, UserId};

/// Rendering flags derived from a record and its bucket neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleFlags {
    /// Authored by someone other than the local user.
    pub received: bool,
    /// Last bubble of a run from the same author.
    pub tail: bool,
    /// Extra spacing below the row.
    pub boundary_separator: bool,
    /// Show the author's name above the bubble.
    pub show_author_name: bool,
}

/// Conversation facts style computation depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleContext {
    /// Contact or group.
    pub kind: ConversationKind,
    /// The local user.
    pub me: UserId,
    /// The other party of a contact conversation.
    pub owner: Option<UserId>,
}

impl StyleContext {
    /// Context for a group conversation.
    pub fn group(me: UserId) -> Self {
        Self {
            kind: ConversationKind::Group,
            me,
            owner: None,
        }
    }

    /// Context for a contact conversation with `owner`.
    pub fn contact(me: UserId, owner: UserId) -> Self {
        Self {
            kind: ConversationKind::Contact,
            me,
            owner: Some(owner),
        }
    }
}

/// Whether `other` ends a run of bubbles that `record` belongs to.
fn breaks_run(record: &MessageRecord, other: &MessageRecord) -> bool {
    other.author_id != record.author_id || other.is_pseudo() || other.is_system()
}

/// Whether the record's author should be named in the bubble.
///
/// In groups that is every member message not sent by the local user. In a
/// contact conversation it only happens when someone other than the contact
/// speaks on their behalf (an app acting for a bot owner).
pub fn is_author_attributable(record: &MessageRecord, ctx: &StyleContext) -> bool {
    if record.is_pseudo() || record.is_system() || record.author_id == ctx.me {
        return false;
    }
    match ctx.kind {
        ConversationKind::Group => true,
        ConversationKind::Contact => ctx
            .owner
            .as_ref()
            .is_some_and(|owner| *owner != record.author_id),
    }
}

/// Compute the flags for `record` given its bucket neighbours.
pub fn compute_style(
    record: &MessageRecord,
    predecessor: Option<&MessageRecord>,
    successor: Option<&MessageRecord>,
    ctx: &StyleContext,
) -> StyleFlags {
    let received = record.author_id != ctx.me;

    let tail = successor.map_or(true, |next| breaks_run(record, next));

    let boundary_separator = if record.category == MessageCategory::EncryptionHint {
        true
    } else {
        successor.is_some_and(|next| record.is_system() || breaks_run(record, next))
    };

    let show_author_name = is_author_attributable(record, ctx)
        && predecessor.map_or(true, |prev| breaks_run(record, prev));

    StyleFlags {
        received,
        tail,
        boundary_separator,
        show_author_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::{ConversationId, MessageId};
    use chrono::{TimeZone, Utc};

    fn msg(author: &str, secs: i64) -> MessageRecord {
        MessageRecord::new(
            MessageId::new(),
            ConversationId::from("c"),
            UserId::from(author),
            Utc.timestamp_opt(secs, 0).unwrap(),
            MessageCategory::Text,
        )
    }

    fn system(secs: i64) -> MessageRecord {
        let mut record = msg("alice", secs);
        record.category = MessageCategory::SystemConversation;
        record
    }

    fn group_ctx() -> StyleContext {
        StyleContext::group(UserId::from("me"))
    }

    // ===========================================
    // Tail
    // ===========================================

    #[test]
    fn last_in_bucket_has_tail() {
        let a = msg("alice", 1);
        let style = compute_style(&a, None, None, &group_ctx());
        assert!(style.tail);
        assert!(!style.boundary_separator);
    }

    #[test]
    fn same_author_run_has_no_tail() {
        let a = msg("alice", 1);
        let b = msg("alice", 2);
        let style = compute_style(&a, None, Some(&b), &group_ctx());
        assert!(!style.tail);
        assert!(!style.boundary_separator);
    }

    #[test]
    fn author_change_sets_tail_and_separator() {
        let a = msg("alice", 1);
        let b = msg("bob", 2);
        let style = compute_style(&a, None, Some(&b), &group_ctx());
        assert!(style.tail);
        assert!(style.boundary_separator);
    }

    #[test]
    fn system_successor_breaks_run() {
        let a = msg("alice", 1);
        let s = system(2);
        let style = compute_style(&a, None, Some(&s), &group_ctx());
        assert!(style.tail);
        assert!(style.boundary_separator);
    }

    #[test]
    fn system_record_always_separates_from_successor() {
        let s = system(1);
        let a = msg("alice", 2);
        let style = compute_style(&s, None, Some(&a), &group_ctx());
        assert!(style.boundary_separator);
    }

    // ===========================================
    // Pseudo-records
    // ===========================================

    #[test]
    fn encryption_hint_forces_separator() {
        let hint = MessageRecord::encryption_hint(ConversationId::from("c"), Utc::now());
        let style = compute_style(&hint, None, None, &group_ctx());
        assert!(style.boundary_separator);
        assert!(!style.show_author_name);
    }

    #[test]
    fn record_after_divider_shows_name() {
        let divider = MessageRecord::unread_divider(ConversationId::from("c"), Utc::now());
        let a = msg("alice", 2);
        let style = compute_style(&a, Some(&divider), None, &group_ctx());
        assert!(style.show_author_name);
    }

    // ===========================================
    // Author name
    // ===========================================

    #[test]
    fn first_in_bucket_shows_name_in_group() {
        let a = msg("alice", 1);
        assert!(compute_style(&a, None, None, &group_ctx()).show_author_name);
    }

    #[test]
    fn continuation_hides_name() {
        let a = msg("alice", 1);
        let b = msg("alice", 2);
        assert!(!compute_style(&b, Some(&a), None, &group_ctx()).show_author_name);
    }

    #[test]
    fn own_messages_never_show_name() {
        let mine = msg("me", 1);
        let style = compute_style(&mine, None, None, &group_ctx());
        assert!(!style.show_author_name);
        assert!(!style.received);
    }

    #[test]
    fn contact_conversation_hides_owner_name() {
        let ctx = StyleContext::contact(UserId::from("me"), UserId::from("bob"));
        let from_owner = msg("bob", 1);
        let from_app = msg("app-bot", 2);
        assert!(!compute_style(&from_owner, None, None, &ctx).show_author_name);
        assert!(compute_style(&from_app, None, None, &ctx).show_author_name);
    }
}

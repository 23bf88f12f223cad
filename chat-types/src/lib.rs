//! # chat-types
//!
//! Shared types for the convsync message synchronization core.
//!
//! This crate provides the foundational types used across all convsync crates:
//! - [`MessageId`], [`ConversationId`], [`UserId`] - Identity types
//! - [`MessageRecord`] - A rendering-ready message row
//! - [`ConversationMeta`] - Conversation-level fields that never touch buckets
//! - [`ChangeEvent`] - Mutation notifications carried on the change bus
//! - [`ParseError`] - Error type for parsing wire strings

#![warn(missing_docs)]
#![warn(clippy::all)]

mod conversation;
mod error;
mod event;
mod ids;
mod message;

pub use conversation::{ConversationKind, ConversationMeta};
pub use error::ParseError;
pub use event::{ChangeEvent, ConversationChange};
pub use ids::{ConversationId, MessageId, UserId};
pub use message::{MediaStatus, MessageCategory, MessageRecord, MessageStatus};

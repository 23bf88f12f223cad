//! # chat-core
//!
//! Pure logic for the convsync message synchronization core (no I/O, instant tests).
//!
//! This crate implements the data structures and state machines behind the
//! conversation message store and the job retry engine, without any async
//! runtime, network or disk access.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`cache`] owns the date-bucketed view-model cache and its merge rules
//! - [`style`] is the single place grouping/boundary flags are computed
//! - [`lifecycle`] and [`retry`] are transition functions the async layer interprets
//!
//! The actual I/O (message log fetches, delivery, waiting) is performed by
//! `chat-client`, which drives these structures.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod date_key;
pub mod lifecycle;
pub mod pagination;
pub mod pending;
pub mod retry;
pub mod style;

pub use cache::{InsertOutcome, MergeOutcome, MessageCache, MessageViewModel, RemoveOutcome, RowIndex};
pub use date_key::{utc_offset, DateKey};
pub use lifecycle::{ChangeDisposition, LifecycleEvent, StoreAction, StoreLifecycle};
pub use pagination::{
    choose_initial_anchor, Direction, Frontiers, InFlight, InitialAnchor, PageRequest,
};
pub use pending::PendingChangeQueue;
pub use retry::{classify_http_status, ErrorClass, JobPhase, JobSignal, RetryPolicy};
pub use style::{compute_style, is_author_attributable, StyleContext, StyleFlags};

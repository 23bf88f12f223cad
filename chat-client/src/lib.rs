//! # chat-client
//!
//! Async runtime layer of the convsync messenger core.
//!
//! ## Features
//!
//! - **Job Scheduler**: gated, retrying execution of outbound work
//!   (network, session and socket gates; transient vs fatal errors)
//! - **Connectivity Gate**: shared, watchable connectivity snapshot
//! - **Change Bus**: per-conversation, ordered change event fan-out
//! - **Message Store**: concurrent, paginated, date-bucketed message cache
//!   driven by `chat-core`
//!
//! ## Example
//!
//! ```ignore
//! use chat_client::{ChangeBus, MessageStore, MockMessageLog, NoopAcknowledger, ScrollAnchors, StoreDeps};
//!
//! let deps = StoreDeps {
//!     log: Arc::new(MockMessageLog::new()),
//!     bus: ChangeBus::new(),
//!     anchors: ScrollAnchors::new(),
//!     acknowledger: Arc::new(NoopAcknowledger),
//! };
//! let store = MessageStore::open(ctx, meta, deps, None);
//! store.initialize(None).await;
//! store.load_more(Direction::Above).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anchors;
pub mod bus;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod diagnostics;
pub mod job;
pub mod message_log;
pub mod queue;
pub mod scheduler;
pub mod store;

pub use anchors::{ScrollAnchor, ScrollAnchors};
pub use bus::{ChangeBus, Subscription};
pub use config::{ClientConfig, ConfigError, SchedulerConfig, StoreConfig};
pub use connectivity::{ClientContext, ConnectivityGate, ConnectivityPublisher, ConnectivityState};
pub use delivery::{
    DeliveryCall, DeliveryJob, DeliveryKind, DeliveryService, MockDelivery, NoopAcknowledger,
    OutboundDispatcher, ReadAcknowledger,
};
pub use diagnostics::{DiagnosticsSink, MemoryDiagnostics, TracingDiagnostics};
pub use job::{Job, JobError};
pub use message_log::{LogError, MessageLog, MockMessageLog};
pub use queue::JobQueue;
pub use scheduler::{JobOutcome, JobScheduler};
pub use store::{
    Highlight, InitOutcome, InitialPosition, LoadOutcome, MessageStore, StoreDeps, StoreNotice,
};

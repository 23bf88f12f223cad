//! Outbound delivery: sending messages, read acknowledgements and
//! attachment downloads, each wrapped in a scheduler-driven job.
//!
//! # Design
//!
//! There is one job type. What it does is data ([`DeliveryKind`]); how it
//! reaches the server is the [`DeliveryService`] trait.
//!
//! ```ignore
//! let dispatcher = OutboundDispatcher::new(queue, Arc::new(MockDelivery::new()));
//! dispatcher.send(record);
//! dispatcher.acknowledge_read(&id);
//! ```

mod mock;

pub use mock::{DeliveryCall, MockDelivery};

use crate::job::{Job, JobError};
use crate::queue::JobQueue;
use crate::scheduler::JobOutcome;
use async_trait::async_trait;
use chat_types::{ConversationId, MessageId, MessageRecord, UserId};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Network operations performed on behalf of delivery jobs.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Send a message.
    async fn send(&self, record: &MessageRecord) -> Result<(), JobError>;

    /// Acknowledge one message as read.
    async fn acknowledge_read(&self, id: &MessageId) -> Result<(), JobError>;

    /// Acknowledge every message of a conversation as read.
    async fn acknowledge_read_batch(&self, conversation: &ConversationId) -> Result<(), JobError>;

    /// Download a message's attachment.
    async fn download_attachment(&self, id: &MessageId) -> Result<(), JobError>;
}

/// What a delivery job does.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryKind {
    /// Send a message over the socket.
    Send(MessageRecord),
    /// Mark one message read.
    AcknowledgeRead(MessageId),
    /// Mark a whole conversation read.
    AcknowledgeReadBatch(ConversationId),
    /// Fetch an attachment.
    DownloadAttachment(MessageId),
}

impl DeliveryKind {
    /// Stable job id for de-duplication.
    pub fn job_id(&self) -> String {
        match self {
            Self::Send(record) => format!("send-{}", record.id),
            Self::AcknowledgeRead(id) => format!("ack-read-{}", id),
            Self::AcknowledgeReadBatch(conversation) => format!("ack-read-batch-{}", conversation),
            Self::DownloadAttachment(id) => format!("attachment-download-{}", id),
        }
    }
}

/// A [`DeliveryKind`] bound to the service that performs it.
pub struct DeliveryJob {
    kind: DeliveryKind,
    service: Arc<dyn DeliveryService>,
}

impl DeliveryJob {
    /// Bind `kind` to `service`.
    pub fn new(kind: DeliveryKind, service: Arc<dyn DeliveryService>) -> Self {
        Self { kind, service }
    }

    /// The job's kind.
    pub fn kind(&self) -> &DeliveryKind {
        &self.kind
    }
}

#[async_trait]
impl Job for DeliveryJob {
    fn id(&self) -> String {
        self.kind.job_id()
    }

    fn requires_socket(&self) -> bool {
        matches!(self.kind, DeliveryKind::Send(_))
    }

    async fn run(&self) -> Result<(), JobError> {
        match &self.kind {
            DeliveryKind::Send(record) => self.service.send(record).await,
            DeliveryKind::AcknowledgeRead(id) => self.service.acknowledge_read(id).await,
            DeliveryKind::AcknowledgeReadBatch(conversation) => {
                self.service.acknowledge_read_batch(conversation).await
            }
            DeliveryKind::DownloadAttachment(id) => self.service.download_attachment(id).await,
        }
    }
}

/// Side effects the message store triggers when records become visible.
pub trait ReadAcknowledger: Send + Sync {
    /// A single message from someone else was shown.
    fn acknowledge_read(&self, id: &MessageId);

    /// The conversation was opened.
    fn acknowledge_conversation(&self, conversation: &ConversationId);
}

/// Acknowledger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAcknowledger;

impl ReadAcknowledger for NoopAcknowledger {
    fn acknowledge_read(&self, _id: &MessageId) {}

    fn acknowledge_conversation(&self, _conversation: &ConversationId) {}
}

/// Submits delivery jobs to a [`JobQueue`].
#[derive(Clone)]
pub struct OutboundDispatcher {
    queue: JobQueue,
    service: Arc<dyn DeliveryService>,
}

impl OutboundDispatcher {
    /// Dispatcher submitting to `queue` and delivering through `service`.
    pub fn new(queue: JobQueue, service: Arc<dyn DeliveryService>) -> Self {
        Self { queue, service }
    }

    /// The underlying queue.
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Submit a job of `kind`. `None` when an identical job is in flight.
    pub fn dispatch(&self, kind: DeliveryKind) -> Option<JoinHandle<JobOutcome>> {
        let job = DeliveryJob::new(kind, Arc::clone(&self.service));
        self.queue.submit(Arc::new(job))
    }

    /// Send `record`.
    pub fn send(&self, record: MessageRecord) -> Option<JoinHandle<JobOutcome>> {
        self.dispatch(DeliveryKind::Send(record))
    }

    /// Compose a text message from `author` and send it.
    ///
    /// Returns the pending record so the caller can show it right away.
    pub fn send_text(
        &self,
        author: &UserId,
        conversation: &ConversationId,
        content: impl Into<String>,
        quote_id: Option<MessageId>,
    ) -> (MessageRecord, Option<JoinHandle<JobOutcome>>) {
        let record = MessageRecord::outgoing_text(conversation.clone(), author.clone(), content, quote_id);
        tracing::debug!("Sending {} to {}", record.id, conversation);
        let handle = self.send(record.clone());
        (record, handle)
    }

    /// Download the attachment of `id`.
    pub fn download_attachment(&self, id: MessageId) -> Option<JoinHandle<JobOutcome>> {
        self.dispatch(DeliveryKind::DownloadAttachment(id))
    }
}

impl ReadAcknowledger for OutboundDispatcher {
    fn acknowledge_read(&self, id: &MessageId) {
        self.dispatch(DeliveryKind::AcknowledgeRead(id.clone()));
    }

    fn acknowledge_conversation(&self, conversation: &ConversationId) {
        self.dispatch(DeliveryKind::AcknowledgeReadBatch(conversation.clone()));
    }
}

//! Mock delivery service for testing.
//!
//! Records every successful call, counts every attempt, and fails upcoming
//! calls with queued errors.

use super::DeliveryService;
use crate::job::JobError;
use async_trait::async_trait;
use chat_types::{ConversationId, MessageId, MessageRecord};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A call that reached the (mock) server successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryCall {
    /// `send`.
    Send(MessageId),
    /// `acknowledge_read`.
    AcknowledgeRead(MessageId),
    /// `acknowledge_read_batch`.
    AcknowledgeReadBatch(ConversationId),
    /// `download_attachment`.
    DownloadAttachment(MessageId),
}

#[derive(Debug, Default)]
struct MockDeliveryInner {
    attempts: usize,
    delivered: Vec<DeliveryCall>,
    fail_queue: VecDeque<JobError>,
}

/// Mock delivery service.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockDelivery {
    inner: Arc<Mutex<MockDeliveryInner>>,
    delivered_tx: Arc<watch::Sender<usize>>,
}

impl Default for MockDelivery {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDelivery {
    /// Create a mock that accepts everything.
    pub fn new() -> Self {
        let (delivered_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(MockDeliveryInner::default())),
            delivered_tx: Arc::new(delivered_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockDeliveryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next call (of any kind) with `error`. Errors queue up in order.
    pub fn fail_next(&self, error: JobError) {
        self.lock().fail_queue.push_back(error);
    }

    /// Number of calls made, failed or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Calls that succeeded, in order.
    pub fn delivered(&self) -> Vec<DeliveryCall> {
        self.lock().delivered.clone()
    }

    /// Wait until at least `count` calls have succeeded.
    pub async fn wait_for_deliveries(&self, count: usize) {
        let mut rx = self.delivered_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|delivered| *delivered >= count).await;
    }

    fn record(&self, call: DeliveryCall) -> Result<(), JobError> {
        let delivered = {
            let mut inner = self.lock();
            inner.attempts += 1;
            if let Some(error) = inner.fail_queue.pop_front() {
                return Err(error);
            }
            inner.delivered.push(call);
            inner.delivered.len()
        };
        self.delivered_tx.send_replace(delivered);
        Ok(())
    }
}

#[async_trait]
impl DeliveryService for MockDelivery {
    async fn send(&self, record: &MessageRecord) -> Result<(), JobError> {
        self.record(DeliveryCall::Send(record.id.clone()))
    }

    async fn acknowledge_read(&self, id: &MessageId) -> Result<(), JobError> {
        self.record(DeliveryCall::AcknowledgeRead(id.clone()))
    }

    async fn acknowledge_read_batch(&self, conversation: &ConversationId) -> Result<(), JobError> {
        self.record(DeliveryCall::AcknowledgeReadBatch(conversation.clone()))
    }

    async fn download_attachment(&self, id: &MessageId) -> Result<(), JobError> {
        self.record(DeliveryCall::DownloadAttachment(id.clone()))
    }
}

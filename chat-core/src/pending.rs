//! Changes received before the store finished its first load.
//!
//! Events are kept in arrival order and handed out exactly once via
//! [`PendingChangeQueue::take_all`].

use chat_types::ChangeEvent;
use std::collections::VecDeque;

/// FIFO of change events waiting for initialization to complete.
#[derive(Debug, Default)]
pub struct PendingChangeQueue {
    queue: VecDeque<ChangeEvent>,
}

impl PendingChangeQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn enqueue(&mut self, event: ChangeEvent) {
        self.queue.push_back(event);
    }

    /// Drain every queued event in arrival order.
    pub fn take_all(&mut self) -> Vec<ChangeEvent> {
        self.queue.drain(..).collect()
    }

    /// Put `events` back at the head of the queue, ahead of anything queued
    /// since they were taken, keeping their relative order.
    pub fn requeue_front(&mut self, events: Vec<ChangeEvent>) {
        for event in events.into_iter().rev() {
            self.queue.push_front(event);
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discard everything queued.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

//! Conversation-scoped change channel.
//!
//! Any collaborator may publish a [`ChangeEvent`] for a conversation. Each
//! subscriber gets its own unbounded queue, so a slow store never blocks a
//! publisher and never loses events. Dropping a [`Subscription`]
//! unsubscribes it.

use chat_types::{ChangeEvent, ConversationChange, ConversationId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Route = (u64, mpsc::UnboundedSender<ChangeEvent>);

/// Process-wide change bus.
///
/// Clones share the same routes.
#[derive(Debug, Clone, Default)]
pub struct ChangeBus {
    routes: Arc<DashMap<ConversationId, Vec<Route>>>,
    next_id: Arc<AtomicU64>,
}

impl ChangeBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every subscriber of `conversation`.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, conversation: &ConversationId, event: ChangeEvent) -> usize {
        let Some(mut subscribers) = self.routes.get_mut(conversation) else {
            tracing::trace!("No subscribers for {} ({})", conversation, event.kind());
            return 0;
        };
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Deliver an addressed change.
    pub fn publish_change(&self, change: ConversationChange) -> usize {
        self.publish(&change.conversation_id, change.event)
    }

    /// Receive every event published for `conversation` from now on.
    pub fn subscribe(&self, conversation: ConversationId) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.entry(conversation.clone()).or_default().push((id, tx));
        tracing::debug!("Subscribed {} to conversation {}", id, conversation);
        Subscription {
            id,
            conversation,
            rx,
            routes: Arc::clone(&self.routes),
        }
    }

    /// Live subscribers of `conversation`.
    pub fn subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.routes.get(conversation).map_or(0, |subs| subs.len())
    }
}

/// One subscriber's event stream.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    conversation: ConversationId,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    routes: Arc<DashMap<ConversationId, Vec<Route>>>,
}

impl Subscription {
    /// Conversation this subscription follows.
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Next event in publication order. `None` only if the bus is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let now_empty = match self.routes.get_mut(&self.conversation) {
            Some(mut subscribers) => {
                subscribers.retain(|(id, _)| *id != self.id);
                subscribers.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.routes
                .remove_if(&self.conversation, |_, subscribers| subscribers.is_empty());
        }
        tracing::debug!("Unsubscribed {} from conversation {}", self.id, self.conversation);
    }
}

//! In-memory message log for testing.
//!
//! Records are kept sorted per conversation. Every page request is recorded,
//! the next fetch can be forced to fail, and fetches can be held at an async
//! gate so tests can interleave them with other operations.

use super::{LogError, MessageLog};
use async_trait::async_trait;
use chat_core::PageRequest;
use chat_types::{ConversationId, MessageId, MessageRecord};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct MockMessageLogInner {
    conversations: HashMap<ConversationId, Vec<MessageRecord>>,
    first_unread: HashMap<ConversationId, MessageId>,
    unread_counts: HashMap<ConversationId, u64>,
    requests: Vec<PageRequest>,
    full_record_fetches: usize,
    fail_next_fetch: Option<String>,
}

/// Mock message log.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockMessageLog {
    inner: Arc<Mutex<MockMessageLogInner>>,
    held: Arc<watch::Sender<bool>>,
    started: Arc<watch::Sender<usize>>,
}

impl Default for MockMessageLog {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_key(record: &MessageRecord) -> (chrono::DateTime<chrono::Utc>, i64) {
    (record.created_at, record.sequence_order)
}

fn page_range(records: &[MessageRecord], request: &PageRequest, count: usize) -> Range<usize> {
    let len = records.len();
    let latest = len.saturating_sub(count)..len;
    let position = |id: &MessageId| records.iter().position(|r| r.id == *id);
    match request {
        PageRequest::Latest => latest,
        PageRequest::Above(id) => match position(id) {
            Some(i) => i.saturating_sub(count)..i,
            None => 0..0,
        },
        PageRequest::Below(id) => match position(id) {
            Some(i) => (i + 1)..(i + 1 + count).min(len),
            None => 0..0,
        },
        PageRequest::Around(id) => match position(id) {
            Some(i) => {
                let start = i.saturating_sub(count / 2);
                start..(start + count).min(len)
            }
            None => latest,
        },
    }
}

impl MockMessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (held, _) = watch::channel(false);
        let (started, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(MockMessageLogInner::default())),
            held: Arc::new(held),
            started: Arc::new(started),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockMessageLogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record, keeping its conversation sorted.
    pub fn insert(&self, record: MessageRecord) {
        let mut inner = self.lock();
        let records = inner.conversations.entry(record.conversation_id.clone()).or_default();
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
            return;
        }
        let key = sort_key(&record);
        let at = records.partition_point(|r| sort_key(r) <= key);
        records.insert(at, record);
    }

    /// Insert many records.
    pub fn extend(&self, records: impl IntoIterator<Item = MessageRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Mutate a stored record. Returns whether it was found.
    pub fn update<F>(&self, id: &MessageId, apply: F) -> bool
    where
        F: FnOnce(&mut MessageRecord),
    {
        let mut inner = self.lock();
        let found = inner
            .conversations
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .find(|r| r.id == *id);
        match found {
            Some(record) => {
                apply(record);
                true
            }
            None => false,
        }
    }

    /// Set (or clear) the first unread message of `conversation`.
    pub fn set_first_unread(&self, conversation: &ConversationId, id: Option<MessageId>) {
        let mut inner = self.lock();
        match id {
            Some(id) => inner.first_unread.insert(conversation.clone(), id),
            None => inner.first_unread.remove(conversation),
        };
    }

    /// Set the unread count of `conversation`.
    pub fn set_unread_count(&self, conversation: &ConversationId, count: u64) {
        self.lock().unread_counts.insert(conversation.clone(), count);
    }

    /// Cause the next `fetch_page` to fail with the given error.
    pub fn fail_next_fetch(&self, error: &str) {
        self.lock().fail_next_fetch = Some(error.to_string());
    }

    /// Page requests made so far, in order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.lock().requests.clone()
    }

    /// Number of `fetch_page` calls started.
    pub fn fetch_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Number of `fetch_full_record` calls.
    pub fn full_record_fetches(&self) -> usize {
        self.lock().full_record_fetches
    }

    /// Make `fetch_page` calls block until [`MockMessageLog::release_fetches`].
    pub fn hold_fetches(&self) {
        self.held.send_replace(true);
    }

    /// Let held and future fetches through.
    pub fn release_fetches(&self) {
        self.held.send_replace(false);
    }

    /// Wait until at least `count` `fetch_page` calls have started.
    pub async fn wait_for_fetches(&self, count: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }
}

#[async_trait]
impl MessageLog for MockMessageLog {
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        request: &PageRequest,
        count: usize,
    ) -> Result<Vec<MessageRecord>, LogError> {
        let mut held = self.held.subscribe();
        let started = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            inner.requests.len()
        };
        self.started.send_replace(started);

        let _ = held.wait_for(|held| !*held).await;

        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(LogError::Unavailable(error));
        }
        let Some(records) = inner.conversations.get(conversation) else {
            return Ok(Vec::new());
        };
        let range = page_range(records, request, count);
        Ok(records[range].to_vec())
    }

    async fn fetch_full_record(&self, id: &MessageId) -> Result<Option<MessageRecord>, LogError> {
        let mut inner = self.lock();
        inner.full_record_fetches += 1;
        Ok(inner
            .conversations
            .values()
            .flat_map(|records| records.iter())
            .find(|r| r.id == *id)
            .cloned())
    }

    async fn first_unread_id(&self, conversation: &ConversationId) -> Result<Option<MessageId>, LogError> {
        Ok(self.lock().first_unread.get(conversation).cloned())
    }

    async fn unread_count(&self, conversation: &ConversationId) -> Result<u64, LogError> {
        Ok(self.lock().unread_counts.get(conversation).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::{MessageCategory, UserId};
    use chrono::{Duration, TimeZone, Utc};

    fn conv() -> ConversationId {
        ConversationId::from("c")
    }

    fn seeded(n: i64) -> MockMessageLog {
        let log = MockMessageLog::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        log.extend((0..n).map(|i| {
            MessageRecord::new(
                MessageId::from(format!("m{i}")),
                conv(),
                UserId::from("alice"),
                base + Duration::minutes(i),
                MessageCategory::Text,
            )
        }));
        log
    }

    fn ids(records: &[MessageRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.as_str().to_string()).collect()
    }

    #[tokio::test]
    async fn latest_returns_newest_page() {
        let log = seeded(10);
        let page = log.fetch_page(&conv(), &PageRequest::Latest, 3).await.unwrap();
        assert_eq!(ids(&page), vec!["m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn above_and_below_exclude_the_edge() {
        let log = seeded(10);
        let above = log
            .fetch_page(&conv(), &PageRequest::Above(MessageId::from("m5")), 3)
            .await
            .unwrap();
        let below = log
            .fetch_page(&conv(), &PageRequest::Below(MessageId::from("m5")), 10)
            .await
            .unwrap();
        assert_eq!(ids(&above), vec!["m2", "m3", "m4"]);
        assert_eq!(ids(&below), vec!["m6", "m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn around_centres_on_anchor() {
        let log = seeded(10);
        let page = log
            .fetch_page(&conv(), &PageRequest::Around(MessageId::from("m5")), 4)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["m3", "m4", "m5", "m6"]);

        let first = log
            .fetch_page(&conv(), &PageRequest::Around(MessageId::from("m0")), 4)
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["m0", "m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn forced_failure_applies_once() {
        let log = seeded(2);
        log.fail_next_fetch("disk gone");
        assert!(log.fetch_page(&conv(), &PageRequest::Latest, 5).await.is_err());
        assert_eq!(log.fetch_page(&conv(), &PageRequest::Latest, 5).await.unwrap().len(), 2);
        assert_eq!(log.fetch_count(), 2);
    }

    #[tokio::test]
    async fn held_fetch_waits_for_release() {
        let log = seeded(3);
        log.hold_fetches();
        let task = {
            let log = log.clone();
            tokio::spawn(async move { log.fetch_page(&conv(), &PageRequest::Latest, 5).await })
        };
        log.wait_for_fetches(1).await;
        assert!(!task.is_finished());

        log.release_fetches();
        assert_eq!(task.await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_changes_full_record() {
        let log = seeded(1);
        let id = MessageId::from("m0");
        assert!(log.update(&id, |r| r.content = Some("edited".into())));
        let record = log.fetch_full_record(&id).await.unwrap().unwrap();
        assert_eq!(record.content.as_deref(), Some("edited"));
        assert_eq!(log.full_record_fetches(), 1);
    }
}

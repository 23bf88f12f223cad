//! Page through a synthetic conversation.

use anyhow::{bail, Result};
use chat_client::{
    ChangeBus, ClientConfig, ClientContext, ConnectivityGate, ConnectivityState, InitOutcome, LoadOutcome,
    MessageStore, MockMessageLog, NoopAcknowledger, ScrollAnchors, StoreDeps,
};
use chat_core::Direction;
use chat_types::{ConversationId, ConversationMeta, MessageCategory, MessageId, MessageRecord, UserId};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

const AUTHORS: [&str; 3] = ["me", "alice", "bob"];

/// What the store ended up holding.
#[derive(Debug, Serialize)]
pub struct PaginationReport {
    /// Records returned by the initial load.
    pub initial_fetched: usize,
    /// Records returned by each page load, in order.
    pub pages: Vec<usize>,
    /// Persisted records in the cache.
    pub loaded: usize,
    /// All rows, pseudo rows included.
    pub rows: usize,
    /// Date buckets.
    pub sections: usize,
    /// The oldest record is loaded.
    pub reached_earliest: bool,
    /// The newest record is loaded.
    pub reached_latest: bool,
    /// Bucket and id-set invariants hold.
    pub consistent: bool,
}

/// `count` messages `m0..`, oldest first, fifteen minutes apart and ending now.
fn synthetic_history(conversation: &ConversationId, count: usize) -> Vec<MessageRecord> {
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let minutes_ago = 15 * (count - i) as i64;
            MessageRecord::new(
                MessageId::from(format!("m{i}")),
                conversation.clone(),
                UserId::from(AUTHORS[i % AUTHORS.len()]),
                now - Duration::minutes(minutes_ago),
                MessageCategory::Text,
            )
            .with_content(format!("message {i}"))
        })
        .collect()
}

/// Open a store over `messages` synthetic records and load pages in
/// `direction` until history is exhausted or `max_pages` were loaded.
pub async fn run(
    config: &ClientConfig,
    messages: usize,
    anchor: Option<String>,
    direction: Direction,
    max_pages: usize,
) -> Result<PaginationReport> {
    let conversation = ConversationId::from("sim-conversation");
    let log = MockMessageLog::new();
    log.extend(synthetic_history(&conversation, messages));

    let (_publisher, gate) = ConnectivityGate::channel(ConnectivityState::online());
    let ctx = ClientContext::new(gate, UserId::from("me"), config.clone());
    let deps = StoreDeps {
        log: Arc::new(log),
        bus: ChangeBus::new(),
        anchors: ScrollAnchors::new(),
        acknowledger: Arc::new(NoopAcknowledger),
    };
    let meta = ConversationMeta::group(conversation, "Simulation");
    let store = MessageStore::open(ctx, meta, deps, None);

    let initial_fetched = match store.initialize(anchor.map(MessageId::from)).await {
        InitOutcome::Ready { fetched } => fetched,
        other => bail!("Initialization did not complete: {:?}", other),
    };

    let mut pages = Vec::new();
    while pages.len() < max_pages {
        match store.load_more(direction).await {
            LoadOutcome::Loaded { fetched, .. } => pages.push(fetched),
            LoadOutcome::Skipped => break,
            other => bail!("Page load failed: {:?}", other),
        }
    }
    tracing::info!("Loaded {} pages {:?}", pages.len(), direction);

    let frontiers = store.frontiers();
    let records = store.records();
    let report = PaginationReport {
        initial_fetched,
        pages,
        loaded: records.iter().filter(|r| !r.is_pseudo()).count(),
        rows: records.len(),
        sections: store.section_count(),
        reached_earliest: frontiers.reached_earliest(),
        reached_latest: frontiers.reached_latest(),
        consistent: store.is_consistent(),
    };
    store.teardown().await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_down_to_the_newest_message() {
        let report = run(&ClientConfig::default(), 350, Some("m0".into()), Direction::Below, 10)
            .await
            .unwrap();

        assert_eq!(report.initial_fetched, 100);
        assert_eq!(report.pages, vec![100, 100, 50]);
        assert_eq!(report.loaded, 350);
        assert!(report.reached_latest);
        assert!(report.consistent);
    }

    #[tokio::test]
    async fn short_history_needs_no_pages() {
        let report = run(&ClientConfig::default(), 30, None, Direction::Above, 10)
            .await
            .unwrap();

        assert_eq!(report.initial_fetched, 30);
        assert!(report.pages.is_empty());
        assert_eq!(report.rows, 31);
        assert!(report.reached_earliest && report.reached_latest);
    }

    #[tokio::test]
    async fn page_limit_is_respected() {
        let mut config = ClientConfig::default();
        config.store.page_size = 10;

        let report = run(&config, 350, None, Direction::Above, 2).await.unwrap();

        assert_eq!(report.pages, vec![10, 10]);
        assert_eq!(report.loaded, 30);
        assert!(!report.reached_earliest);
    }
}

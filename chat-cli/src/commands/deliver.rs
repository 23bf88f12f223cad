//! Send one message through the job scheduler.

use anyhow::{Context, Result};
use chat_client::{
    ClientConfig, ConnectivityGate, ConnectivityState, DeliveryKind, JobError, JobQueue, JobScheduler,
    MemoryDiagnostics, MockDelivery, OutboundDispatcher,
};
use chat_types::{ConversationId, MessageCategory, MessageId, MessageRecord, MessageStatus, UserId};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How the send went.
#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    /// Job id used for de-duplication.
    pub job_id: String,
    /// Final job outcome.
    pub outcome: String,
    /// Calls that reached the service, failed or not.
    pub attempts: usize,
    /// Calls that succeeded.
    pub delivered: usize,
    /// Fatal errors reported to diagnostics.
    pub fatal_reports: usize,
}

/// Send a message while the network is down for `offline_ms` and the server
/// answers 503 `failures` times, optionally ending with a rejection.
pub async fn run(config: &ClientConfig, offline_ms: u64, failures: usize, reject: bool) -> Result<DeliveryReport> {
    let initial = if offline_ms > 0 {
        ConnectivityState::offline()
    } else {
        ConnectivityState::online()
    };
    let (publisher, gate) = ConnectivityGate::channel(initial);
    let diagnostics = MemoryDiagnostics::new();
    let scheduler = JobScheduler::with_policy(gate, config.scheduler.retry_policy(), Arc::new(diagnostics.clone()));

    let delivery = MockDelivery::new();
    for _ in 0..failures {
        delivery.fail_next(JobError::Http { status: 503 });
    }
    if reject {
        delivery.fail_next(JobError::Rejected("message blocked by recipient".into()));
    }
    let dispatcher = OutboundDispatcher::new(JobQueue::new(scheduler), Arc::new(delivery.clone()));

    let record = MessageRecord::new(
        MessageId::new(),
        ConversationId::from("sim-conversation"),
        UserId::from("me"),
        Utc::now(),
        MessageCategory::Text,
    )
    .with_content("hello")
    .with_status(MessageStatus::Sending);
    let job_id = DeliveryKind::Send(record.clone()).job_id();
    let handle = dispatcher.send(record).context("Send job already in flight")?;

    if offline_ms > 0 {
        tokio::time::sleep(Duration::from_millis(offline_ms)).await;
        tracing::info!("Network reachable after {} ms", offline_ms);
        publisher.publish(ConnectivityState::online());
    }

    let outcome = handle.await.context("Send job panicked")?;
    Ok(DeliveryReport {
        job_id,
        outcome: format!("{:?}", outcome),
        attempts: delivery.attempts(),
        delivered: delivery.delivered().len(),
        fatal_reports: diagnostics.reports().len(),
    })
}

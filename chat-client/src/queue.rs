//! De-duplicating job queue.
//!
//! Each submitted job runs on its own task through
//! [`JobScheduler::execute`]. While a job with a given id is in flight,
//! further submissions with the same id are dropped.

use crate::job::Job;
use crate::scheduler::{JobOutcome, JobScheduler};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    generation: u64,
    cancel: CancellationToken,
}

/// Runs jobs and tracks the in-flight ones by id.
#[derive(Clone)]
pub struct JobQueue {
    scheduler: JobScheduler,
    in_flight: Arc<DashMap<String, Running>>,
    generation: Arc<AtomicU64>,
}

impl JobQueue {
    /// Queue backed by `scheduler`.
    pub fn new(scheduler: JobScheduler) -> Self {
        Self {
            scheduler,
            in_flight: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start `job` unless one with the same id is already running.
    ///
    /// Returns the task handle, or `None` for a duplicate submission.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, job: Arc<dyn Job>) -> Option<JoinHandle<JobOutcome>> {
        let id = job.id();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!("Dropping duplicate job {}", id);
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(Running {
                    generation,
                    cancel: cancel.clone(),
                });
            }
        }

        let scheduler = self.scheduler.clone();
        let in_flight = Arc::clone(&self.in_flight);
        tracing::debug!("Submitted job {}", id);
        Some(tokio::spawn(async move {
            let outcome = scheduler.execute(job.as_ref(), &cancel).await;
            in_flight.remove_if(&id, |_, running| running.generation == generation);
            tracing::debug!("Job {} finished: {:?}", id, outcome);
            outcome
        }))
    }

    /// Cancel the in-flight job with `id`. Returns whether one was found.
    pub fn cancel(&self, id: &str) -> bool {
        match self.in_flight.remove(id) {
            Some((_, running)) => {
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight job.
    pub fn cancel_all(&self) {
        let ids: Vec<String> = self.in_flight.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.cancel(&id);
        }
    }

    /// Whether a job with `id` is running.
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Number of running jobs.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityGate, ConnectivityState};
    use crate::diagnostics::TracingDiagnostics;
    use crate::job::JobError;
    use async_trait::async_trait;
    use chat_core::RetryPolicy;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        id: String,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn id(&self) -> String {
            self.id.clone()
        }

        async fn run(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn queue(initial: ConnectivityState) -> (JobQueue, crate::connectivity::ConnectivityPublisher) {
        let (publisher, gate) = ConnectivityGate::channel(initial);
        let scheduler = JobScheduler::with_policy(gate, RetryPolicy::default(), Arc::new(TracingDiagnostics));
        (JobQueue::new(scheduler), publisher)
    }

    fn job(id: &str, runs: &Arc<AtomicUsize>) -> Arc<dyn Job> {
        Arc::new(CountingJob {
            id: id.into(),
            runs: Arc::clone(runs),
        })
    }

    #[tokio::test]
    async fn duplicate_submission_is_dropped_while_in_flight() {
        let (queue, _publisher) = queue(ConnectivityState::offline());
        let runs = Arc::new(AtomicUsize::new(0));

        let first = queue.submit(job("send-1", &runs));
        let second = queue.submit(job("send-1", &runs));

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(queue.is_in_flight("send-1"));
        assert_eq!(queue.in_flight_count(), 1);

        queue.cancel_all();
        assert_eq!(first.unwrap().await.unwrap(), JobOutcome::Cancelled);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finished_job_frees_its_id() {
        let (queue, _publisher) = queue(ConnectivityState::online());
        let runs = Arc::new(AtomicUsize::new(0));

        let outcome = queue.submit(job("ack-read-1", &runs)).unwrap().await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert!(!queue.is_in_flight("ack-read-1"));

        queue.submit(job("ack-read-1", &runs)).unwrap().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancel_by_id() {
        let (queue, _publisher) = queue(ConnectivityState::offline());
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = queue.submit(job("a", &runs)).unwrap();
        queue.submit(job("b", &runs)).unwrap();

        assert!(queue.cancel("a"));
        assert!(!queue.cancel("missing"));
        assert_eq!(handle.await.unwrap(), JobOutcome::Cancelled);
        assert!(queue.is_in_flight("b"));
        queue.cancel_all();
    }
}

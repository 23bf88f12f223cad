//! Generic retry driver for [`Job`]s.
//!
//! `execute` runs one job until it is permanently resolved:
//!
//! 1. Stop immediately if cancelled or the session is inactive.
//! 2. Wait until the job's connectivity requirements hold, re-checking on
//!    every connectivity change and at least once per poll interval.
//! 3. Run the action once.
//! 4. Success ends the job. A transient failure sleeps the fixed backoff and
//!    goes back to step 1. A fatal failure is reported to the diagnostics
//!    sink and ends the job.
//!
//! Every wait is raced against the job's cancellation token. The scheduler
//! performs no side effects of its own besides waiting.

use crate::connectivity::{ClientContext, ConnectivityGate};
use crate::diagnostics::DiagnosticsSink;
use crate::job::{Job, JobError};
use chat_core::{ErrorClass, JobPhase, JobSignal, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The action succeeded.
    Succeeded,
    /// The action failed with a fatal error.
    Aborted(JobError),
    /// The owner cancelled the job.
    Cancelled,
    /// The session ended before the action could run.
    SessionEnded,
}

enum GateResult {
    Open,
    Cancelled,
    SessionEnded,
}

/// Executes jobs with connectivity gating and unbounded fixed-backoff retry.
#[derive(Clone)]
pub struct JobScheduler {
    gate: ConnectivityGate,
    policy: RetryPolicy,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl JobScheduler {
    /// Scheduler using the context's connectivity and configured cadence.
    pub fn new(ctx: &ClientContext, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self::with_policy(
            ctx.connectivity.clone(),
            ctx.config.scheduler.retry_policy(),
            diagnostics,
        )
    }

    /// Scheduler with an explicit policy.
    pub fn with_policy(
        gate: ConnectivityGate,
        policy: RetryPolicy,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            gate,
            policy,
            diagnostics,
        }
    }

    /// Polling and backoff cadence.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `job` until it succeeds, aborts, is cancelled or the session ends.
    pub async fn execute(&self, job: &dyn Job, cancel: &CancellationToken) -> JobOutcome {
        let id = job.id();
        let mut phase = JobPhase::Created;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                step(&id, phase, JobSignal::Cancelled);
                return JobOutcome::Cancelled;
            }
            if !self.gate.session_active() {
                step(&id, phase, JobSignal::SessionEnded);
                return JobOutcome::SessionEnded;
            }

            phase = step(&id, phase, JobSignal::BeginGating);
            match self.wait_for_gates(&id, job, cancel).await {
                GateResult::Open => {}
                GateResult::Cancelled => {
                    step(&id, phase, JobSignal::Cancelled);
                    return JobOutcome::Cancelled;
                }
                GateResult::SessionEnded => {
                    step(&id, phase, JobSignal::SessionEnded);
                    return JobOutcome::SessionEnded;
                }
            }

            phase = step(&id, phase, JobSignal::Run);
            attempt = attempt.saturating_add(1);
            tracing::debug!("Running job {} (attempt {})", id, attempt);

            let error = match job.run().await {
                Ok(()) => {
                    step(&id, phase, JobSignal::Succeeded);
                    tracing::info!("Job {} succeeded after {} attempt(s)", id, attempt);
                    return JobOutcome::Succeeded;
                }
                Err(error) => error,
            };

            if cancel.is_cancelled() {
                step(&id, phase, JobSignal::Cancelled);
                return JobOutcome::Cancelled;
            }

            match error.class() {
                ErrorClass::Transient => {
                    phase = step(&id, phase, JobSignal::Failed(ErrorClass::Transient));
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Job {} failed transiently: {}; retrying in {}ms",
                        id,
                        error,
                        delay.as_millis()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            step(&id, phase, JobSignal::Cancelled);
                            return JobOutcome::Cancelled;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    phase = step(&id, phase, JobSignal::BackoffElapsed);
                }
                ErrorClass::Fatal => {
                    step(&id, phase, JobSignal::Failed(ErrorClass::Fatal));
                    self.diagnostics.report(&id, &error);
                    return JobOutcome::Aborted(error);
                }
            }
        }
    }

    async fn wait_for_gates(&self, id: &str, job: &dyn Job, cancel: &CancellationToken) -> GateResult {
        let mut watcher = self.gate.watcher();
        let mut publisher_alive = true;
        let mut logged = false;

        loop {
            if cancel.is_cancelled() {
                return GateResult::Cancelled;
            }
            let state = self.gate.state();
            if !state.session_active {
                return GateResult::SessionEnded;
            }
            let network_ok = !job.requires_network() || state.network_reachable;
            let socket_ok = !job.requires_socket() || state.socket_connected;
            if network_ok && socket_ok {
                return GateResult::Open;
            }
            if !logged {
                tracing::debug!(
                    "Job {} waiting for connectivity (network={}, socket={})",
                    id,
                    state.network_reachable,
                    state.socket_connected
                );
                logged = true;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return GateResult::Cancelled,
                changed = watcher.changed(), if publisher_alive => {
                    if changed.is_err() {
                        publisher_alive = false;
                    }
                }
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }
        }
    }
}

fn step(id: &str, phase: JobPhase, signal: JobSignal) -> JobPhase {
    let next = phase.next(signal);
    if next != phase {
        tracing::trace!("Job {}: {:?} -> {:?}", id, phase, next);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityPublisher, ConnectivityState};
    use crate::diagnostics::MemoryDiagnostics;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct ScriptedJob {
        network: bool,
        socket: bool,
        script: Mutex<VecDeque<Result<(), JobError>>>,
        attempts: Arc<AtomicUsize>,
        cancel_on_run: Option<CancellationToken>,
    }

    impl ScriptedJob {
        fn new(script: Vec<Result<(), JobError>>) -> Self {
            Self {
                network: true,
                socket: false,
                script: Mutex::new(script.into()),
                attempts: Arc::new(AtomicUsize::new(0)),
                cancel_on_run: None,
            }
        }

        fn needing_socket(mut self) -> Self {
            self.socket = true;
            self
        }

        fn attempts(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.attempts)
        }
    }

    #[async_trait]
    impl Job for ScriptedJob {
        fn id(&self) -> String {
            "scripted".into()
        }

        fn requires_network(&self) -> bool {
            self.network
        }

        fn requires_socket(&self) -> bool {
            self.socket
        }

        async fn run(&self) -> Result<(), JobError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_run {
                token.cancel();
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn scheduler(initial: ConnectivityState) -> (JobScheduler, ConnectivityPublisher, MemoryDiagnostics) {
        let (publisher, gate) = ConnectivityGate::channel(initial);
        let diagnostics = MemoryDiagnostics::new();
        let scheduler = JobScheduler::with_policy(gate, RetryPolicy::default(), Arc::new(diagnostics.clone()));
        (scheduler, publisher, diagnostics)
    }

    // ===========================================
    // Immediate outcomes
    // ===========================================

    #[tokio::test]
    async fn success_runs_once() {
        let (scheduler, _publisher, _) = scheduler(ConnectivityState::online());
        let job = ScriptedJob::new(vec![Ok(())]);
        let outcome = scheduler.execute(&job, &CancellationToken::new()).await;
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_job_never_runs() {
        let (scheduler, _publisher, _) = scheduler(ConnectivityState::online());
        let job = ScriptedJob::new(vec![]);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(scheduler.execute(&job, &token).await, JobOutcome::Cancelled);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inactive_session_never_runs() {
        let (scheduler, _publisher, _) = scheduler(ConnectivityState::default());
        let job = ScriptedJob::new(vec![]);
        assert_eq!(
            scheduler.execute(&job, &CancellationToken::new()).await,
            JobOutcome::SessionEnded
        );
        assert_eq!(job.attempts().load(Ordering::SeqCst), 0);
    }

    // ===========================================
    // Retry
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_fixed_backoff() {
        let (scheduler, _publisher, diagnostics) = scheduler(ConnectivityState::online());
        let job = ScriptedJob::new(vec![
            Err(JobError::Http { status: 503 }),
            Err(JobError::Network("reset".into())),
            Ok(()),
        ]);
        let start = Instant::now();

        let outcome = scheduler.execute(&job, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Succeeded);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(diagnostics.reports().is_empty());
    }

    #[tokio::test]
    async fn fatal_failure_aborts_and_reports() {
        let (scheduler, _publisher, diagnostics) = scheduler(ConnectivityState::online());
        let job = ScriptedJob::new(vec![Err(JobError::Rejected("blocked".into()))]);

        let outcome = scheduler.execute(&job, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Aborted(JobError::Rejected("blocked".into())));
        assert_eq!(job.attempts().load(Ordering::SeqCst), 1);
        assert_eq!(diagnostics.reports().len(), 1);
        assert_eq!(diagnostics.reports()[0].0, "scripted");
    }

    #[tokio::test]
    async fn failure_after_cancellation_is_silent() {
        let (scheduler, _publisher, diagnostics) = scheduler(ConnectivityState::online());
        let token = CancellationToken::new();
        let mut job = ScriptedJob::new(vec![Err(JobError::Malformed("x".into()))]);
        job.cancel_on_run = Some(token.clone());

        assert_eq!(scheduler.execute(&job, &token).await, JobOutcome::Cancelled);
        assert!(diagnostics.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let (scheduler, _publisher, _) = scheduler(ConnectivityState::online());
        let job = Arc::new(ScriptedJob::new(vec![
            Err(JobError::Http { status: 500 }),
            Err(JobError::Http { status: 500 }),
        ]));
        let attempts = job.attempts();
        let token = CancellationToken::new();

        let handle = {
            let job = Arc::clone(&job);
            let token = token.clone();
            tokio::spawn(async move { scheduler.execute(job.as_ref(), &token).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), JobOutcome::Cancelled);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    // ===========================================
    // Gating
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn gated_job_waits_for_network_then_runs_once() {
        let (scheduler, publisher, _) = scheduler(ConnectivityState::offline());
        let poll = scheduler.policy().poll_interval;
        let job = Arc::new(ScriptedJob::new(vec![Ok(())]));
        let attempts = job.attempts();

        let handle = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { scheduler.execute(job.as_ref(), &CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        publisher.set_network_reachable(true);
        tokio::time::sleep(poll).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.await.unwrap(), JobOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn socket_job_waits_for_socket() {
        let (scheduler, publisher, _) = scheduler(ConnectivityState::offline());
        publisher.set_network_reachable(true);
        let job = Arc::new(ScriptedJob::new(vec![Ok(())]).needing_socket());
        let attempts = job.attempts();

        let handle = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { scheduler.execute(job.as_ref(), &CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 0);

        publisher.set_socket_connected(true);
        assert_eq!(handle.await.unwrap(), JobOutcome::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_wakes_gated_job() {
        let (scheduler, _publisher, _) = scheduler(ConnectivityState::offline());
        let job = Arc::new(ScriptedJob::new(vec![]));
        let token = CancellationToken::new();

        let handle = {
            let job = Arc::clone(&job);
            let token = token.clone();
            tokio::spawn(async move { scheduler.execute(job.as_ref(), &token).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), JobOutcome::Cancelled);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_end_releases_gated_job() {
        let (scheduler, publisher, _) = scheduler(ConnectivityState::offline());
        let job = Arc::new(ScriptedJob::new(vec![]));

        let handle = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { scheduler.execute(job.as_ref(), &CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        publisher.set_session_active(false);

        assert_eq!(handle.await.unwrap(), JobOutcome::SessionEnded);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_continues_after_publisher_is_gone() {
        let (scheduler, publisher, _) = scheduler(ConnectivityState::offline());
        drop(publisher);
        let job = ScriptedJob::new(vec![]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });

        assert_eq!(scheduler.execute(&job, &token).await, JobOutcome::Cancelled);
        assert_eq!(job.attempts().load(Ordering::SeqCst), 0);
    }
}

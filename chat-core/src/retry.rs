//! Job retry semantics: error classes, the fixed-cadence retry policy and the
//! job lifecycle transitions the scheduler walks through.

use std::time::Duration;

/// Whether a failed job may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network-layer or server-side failure; retry after backoff.
    Transient,
    /// Anything else; abort and report.
    Fatal,
}

impl ErrorClass {
    /// Retry-eligible.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Classify an HTTP status returned by the server.
///
/// 5xx and 429 are transient; every other status is a permanent rejection.
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        429 | 500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

/// Cadence of connectivity polling and retry backoff.
///
/// Both are fixed. Retries are unbounded in count and only limited in rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How often gating re-checks connectivity without a change signal.
    pub poll_interval: Duration,
    /// Sleep between a transient failure and the next attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy from millisecond settings.
    pub fn from_millis(poll_interval_ms: u64, backoff_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Delay before retry number `attempt`; the same for every attempt.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.backoff
    }
}

/// Phase of a job inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    /// Submitted, not yet looked at.
    Created,
    /// Waiting for connectivity.
    GatedWait,
    /// Action executing.
    Running,
    /// Transient failure, sleeping before re-gating.
    RetryWait,
    /// Action succeeded.
    Succeeded,
    /// Fatal failure or session ended.
    Aborted,
    /// Cancelled by the owner.
    Cancelled,
}

/// Inputs to [`JobPhase::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    /// Start (or restart) gating.
    BeginGating,
    /// Gates are open; run the action.
    Run,
    /// Action returned `Ok`.
    Succeeded,
    /// Action returned an error of this class.
    Failed(ErrorClass),
    /// Backoff sleep finished.
    BackoffElapsed,
    /// Session ended while waiting.
    SessionEnded,
    /// Cancellation observed.
    Cancelled,
}

impl JobPhase {
    /// Transition on `signal`. Terminal phases absorb every signal.
    pub fn next(self, signal: JobSignal) -> Self {
        if self.is_terminal() {
            return self;
        }
        match (self, signal) {
            (_, JobSignal::Cancelled) => Self::Cancelled,
            (Self::Created | Self::GatedWait | Self::RetryWait, JobSignal::SessionEnded) => Self::Aborted,
            (Self::Created, JobSignal::BeginGating) => Self::GatedWait,
            (Self::GatedWait, JobSignal::Run) => Self::Running,
            (Self::Running, JobSignal::Succeeded) => Self::Succeeded,
            (Self::Running, JobSignal::Failed(ErrorClass::Transient)) => Self::RetryWait,
            (Self::Running, JobSignal::Failed(ErrorClass::Fatal)) => Self::Aborted,
            (Self::RetryWait, JobSignal::BackoffElapsed) => Self::GatedWait,
            (phase, _) => phase,
        }
    }

    /// No further transitions happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted | Self::Cancelled)
    }
}

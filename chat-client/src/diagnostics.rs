//! Sink for fatal job errors.

use crate::job::JobError;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives every fatal job error. Nothing else crosses the core boundary.
pub trait DiagnosticsSink: Send + Sync {
    /// Record that `job_id` aborted with `error`.
    fn report(&self, job_id: &str, error: &JobError);
}

/// Emits each report as a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, job_id: &str, error: &JobError) {
        tracing::error!("Job {} aborted: {}", job_id, error);
    }
}

/// Keeps reports in memory for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagnostics {
    reports: Arc<Mutex<Vec<(String, JobError)>>>,
}

impl MemoryDiagnostics {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far.
    pub fn reports(&self) -> Vec<(String, JobError)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn report(&self, job_id: &str, error: &JobError) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((job_id.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_reports() {
        let sink = MemoryDiagnostics::new();
        let shared = sink.clone();
        sink.report("send-1", &JobError::Rejected("no".into()));
        assert_eq!(shared.reports(), vec![("send-1".to_string(), JobError::Rejected("no".into()))]);
    }
}

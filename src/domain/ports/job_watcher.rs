//! K8s Job Watcher port (C9).
//!
//! Out of scope for deep specification: the production implementation
//! (polling or watching the Kubernetes API) lives outside this crate. Only
//! the contract the `RunAlgorithm` handler depends on is modelled here,
//! plus an in-memory fake used by tests and by deployments with no real
//! cluster wired up.

use async_trait::async_trait;
use std::time::Duration;

/// Terminal outcome of a Kubernetes job the core is waiting on.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeed { logs_ref: Option<String> },
    Failed { error: String, logs_ref: Option<String> },
}

#[async_trait]
pub trait JobWatcher: Send + Sync {
    /// Block until the named job reaches a terminal state or `timeout`
    /// elapses.
    async fn await_job(&self, job_name: &str, timeout: Duration) -> Option<JobOutcome>;
}

/// In-memory fake: outcomes are registered ahead of time by test code (or,
/// in a `consumer`/`both` deployment with no real watcher configured, left
/// empty so every wait times out).
#[derive(Debug, Default)]
pub struct FakeJobWatcher {
    outcomes: tokio::sync::Mutex<std::collections::HashMap<String, JobOutcome>>,
}

impl FakeJobWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, job_name: impl Into<String>, outcome: JobOutcome) {
        self.outcomes.lock().await.insert(job_name.into(), outcome);
    }
}

#[async_trait]
impl JobWatcher for FakeJobWatcher {
    async fn await_job(&self, job_name: &str, timeout: Duration) -> Option<JobOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.outcomes.lock().await.remove(job_name) {
                return Some(outcome);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_job_returns_registered_outcome() {
        let watcher = FakeJobWatcher::new();
        watcher
            .register("job-1", JobOutcome::Succeed { logs_ref: None })
            .await;

        let outcome = watcher.await_job("job-1", Duration::from_secs(1)).await;
        assert!(matches!(outcome, Some(JobOutcome::Succeed { .. })));
    }

    #[tokio::test]
    async fn await_job_times_out_when_unregistered() {
        let watcher = FakeJobWatcher::new();
        let outcome = watcher.await_job("missing", Duration::from_millis(100)).await;
        assert!(outcome.is_none());
    }
}

//! Retry classification (§7.1): the single place that maps a `DomainError`
//! to a retry decision. The dispatcher consults this instead of inspecting
//! error message text.

use crate::domain::errors::DomainError;
use crate::domain::models::{RetryPolicy, Task};

/// What the dispatcher should do after a handler returns `err`.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Resubmit with `retry_count + 1` after the given back-off.
    Retry { after: std::time::Duration },
    /// Retries exhausted for a retryable error kind; move the task to `Error`.
    Exhausted,
    /// The error kind is not retryable regardless of `retry_count`.
    Terminal,
}

/// Classify `err` against `task`'s current `retry_count` and `retry_policy`,
/// consuming `jitter` (caller-supplied, in `[0, 1]`) for the back-off
/// calculation so this function stays deterministic and testable.
pub fn classify(err: &DomainError, task: &Task, jitter: f64) -> RetryDecision {
    if !err.is_retryable() {
        return RetryDecision::Terminal;
    }
    if task.retry_count >= task.retry_policy.max_attempts {
        return RetryDecision::Exhausted;
    }
    RetryDecision::Retry {
        after: task.retry_policy.backoff_duration(task.retry_count, jitter),
    }
}

/// Convenience for handlers that reschedule themselves before even reaching
/// the dispatcher's generic error path (e.g. `RestartPedestal` on
/// `NamespaceUnavailable`, §4.7) and just need the back-off duration.
pub fn backoff_for(policy: &RetryPolicy, retry_count: u32, jitter: f64) -> std::time::Duration {
    policy.backoff_duration(retry_count, jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskType;

    fn task_with_retries(retry_count: u32, max_attempts: u32) -> Task {
        let mut task = Task::new(TaskType::RunAlgorithm, serde_json::json!({}));
        task.retry_count = retry_count;
        task.retry_policy = RetryPolicy::new(max_attempts, 1);
        task
    }

    #[test]
    fn validation_errors_are_terminal_regardless_of_retry_count() {
        let task = task_with_retries(0, 5);
        let decision = classify(&DomainError::ValidationFailed("bad payload".into()), &task, 0.5);
        assert_eq!(decision, RetryDecision::Terminal);
    }

    #[test]
    fn rate_limited_retries_until_max_attempts_then_exhausts() {
        let task = task_with_retries(4, 5);
        let decision = classify(&DomainError::RateLimited { bucket: "run_algorithm".into() }, &task, 0.5);
        assert!(matches!(decision, RetryDecision::Retry { .. }));

        let exhausted_task = task_with_retries(5, 5);
        let decision = classify(&DomainError::RateLimited { bucket: "run_algorithm".into() }, &exhausted_task, 0.5);
        assert_eq!(decision, RetryDecision::Exhausted);
    }

    #[test]
    fn namespace_unavailable_and_transient_are_retryable() {
        let task = task_with_retries(0, 5);
        assert!(matches!(
            classify(&DomainError::NamespaceUnavailable { prefix: "ts".into() }, &task, 0.0),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            classify(&DomainError::Transient("connection reset".into()), &task, 0.0),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn permission_and_conflict_are_terminal() {
        let task = task_with_retries(0, 5);
        assert_eq!(
            classify(&DomainError::Permission("denied".into()), &task, 0.0),
            RetryDecision::Terminal
        );
        assert_eq!(
            classify(&DomainError::Conflict { entity: "task".into(), id: "x".into() }, &task, 0.0),
            RetryDecision::Terminal
        );
    }
}

//! Task domain model.
//!
//! A task is the unit of work the dispatcher hands to a stage handler. Tasks
//! form chains, not a general graph: each handler decides what (if anything)
//! comes next and submits it itself, rather than the task declaring a set of
//! dependencies up front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// State of a task across its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Persisted, not yet placed on a queue.
    Pending,
    /// Sitting in the delayed queue, waiting for `execute_time`.
    Scheduled,
    /// Sitting in the ready queue, waiting for a worker.
    Ready,
    /// Claimed by a worker, handler in progress.
    Running,
    /// Handler returned success.
    Completed,
    /// Handler returned a terminal error, or retries were exhausted.
    Error,
    /// Cancelled before or during execution.
    Cancelled,
    /// Looping back for another attempt; transitions to `Scheduled` next.
    Rescheduled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Rescheduled => "rescheduled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "scheduled" => Some(Self::Scheduled),
            "ready" => Some(Self::Ready),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "error" | "failed" => Some(Self::Error),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "rescheduled" => Some(Self::Rescheduled),
            _ => None,
        }
    }

    /// Terminal states never leave via the dispatcher.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// States this one may transition to directly.
    pub fn valid_transitions(&self) -> &'static [TaskState] {
        match self {
            Self::Pending => &[Self::Scheduled, Self::Ready, Self::Cancelled],
            Self::Scheduled => &[Self::Ready, Self::Cancelled],
            Self::Ready => &[Self::Running, Self::Cancelled],
            Self::Running => &[
                Self::Completed,
                Self::Error,
                Self::Cancelled,
                Self::Rescheduled,
            ],
            Self::Rescheduled => &[Self::Scheduled],
            Self::Completed | Self::Error | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Closed set of stage kinds. Adding a new stage means adding a variant here
/// and a matching arm in the handler registry — the registry match is
/// exhaustive, so a forgotten handler is a compile error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RestartPedestal,
    FaultInjection,
    BuildDatapack,
    RunAlgorithm,
    CollectResult,
    BuildContainer,
    CronJob,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestartPedestal => "restart_pedestal",
            Self::FaultInjection => "fault_injection",
            Self::BuildDatapack => "build_datapack",
            Self::RunAlgorithm => "run_algorithm",
            Self::CollectResult => "collect_result",
            Self::BuildContainer => "build_container",
            Self::CronJob => "cron_job",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "restart_pedestal" => Some(Self::RestartPedestal),
            "fault_injection" => Some(Self::FaultInjection),
            "build_datapack" => Some(Self::BuildDatapack),
            "run_algorithm" => Some(Self::RunAlgorithm),
            "collect_result" => Some(Self::CollectResult),
            "build_container" => Some(Self::BuildContainer),
            "cron_job" => Some(Self::CronJob),
            _ => None,
        }
    }
}

/// `maxAttempts` / back-off base for a task's retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_sec: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_sec: 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_sec: u64) -> Self {
        Self {
            max_attempts,
            backoff_sec,
        }
    }

    /// `min(2^retryCount, 5) * (0.3 + rand*0.7) * backoff_sec`, in seconds.
    pub fn backoff_duration(&self, retry_count: u32, jitter: f64) -> std::time::Duration {
        let exponent = 2f64.powi(retry_count as i32).min(5.0);
        let scale = 0.3 + jitter.clamp(0.0, 1.0) * 0.7;
        let seconds = exponent * scale * self.backoff_sec as f64;
        std::time::Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// A single unit of dispatchable work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub state: TaskState,
    pub immediate: bool,
    pub execute_time: DateTime<Utc>,
    pub retry_count: u32,
    pub retry_policy: RetryPolicy,
    pub payload: Value,
    pub parent_task_id: Option<Uuid>,
    pub trace_id: Uuid,
    pub group_id: Uuid,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub level: u32,
    pub trace_carrier: Option<String>,
    pub group_carrier: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Start a new trace: the task is its own root (`level = 0`), with a
    /// freshly minted `trace_id` and `group_id` unless overridden by the
    /// caller before submission.
    pub fn new(task_type: TaskType, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type,
            state: TaskState::Pending,
            immediate: true,
            execute_time: now,
            retry_count: 0,
            retry_policy: RetryPolicy::default(),
            payload,
            parent_task_id: None,
            trace_id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            project_id: None,
            user_id: None,
            level: 0,
            trace_carrier: None,
            group_carrier: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Chain a follow-on task from a handler: inherits `trace_id`,
    /// `group_id`, `project_id`, `user_id` and carriers from `self`, and is
    /// one level deeper.
    pub fn chain(&self, task_type: TaskType, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type,
            state: TaskState::Pending,
            immediate: true,
            execute_time: now,
            retry_count: 0,
            retry_policy: self.retry_policy,
            payload,
            parent_task_id: Some(self.id),
            trace_id: self.trace_id,
            group_id: self.group_id,
            project_id: self.project_id,
            user_id: self.user_id,
            level: self.level + 1,
            trace_carrier: self.trace_carrier.clone(),
            group_carrier: self.group_carrier.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resubmit `self` as its own next occurrence (e.g. `CronJob`'s
    /// recurrence): a fresh task id and payload, but `level` is carried over
    /// unchanged rather than incremented, since per invariant (iv) a
    /// reschedule of a task is not a new child in the trace tree.
    pub fn reschedule_self(&self, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type: self.task_type,
            state: TaskState::Pending,
            immediate: true,
            execute_time: now,
            retry_count: 0,
            retry_policy: self.retry_policy,
            payload,
            parent_task_id: self.parent_task_id,
            trace_id: self.trace_id,
            group_id: self.group_id,
            project_id: self.project_id,
            user_id: self.user_id,
            level: self.level,
            trace_carrier: self.trace_carrier.clone(),
            group_carrier: self.group_carrier.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_execute_time(mut self, at: DateTime<Utc>) -> Self {
        self.immediate = false;
        self.execute_time = at;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_carriers(mut self, trace_carrier: String, group_carrier: String) -> Self {
        self.trace_carrier = Some(trace_carrier);
        self.group_carrier = Some(group_carrier);
        self
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = group_id;
        self
    }

    /// `Pending → Scheduled | Ready | Running | ...` per the state machine.
    /// Bypassed only by [`Task::force_state`] during crash recovery.
    pub fn transition_to(&mut self, new_state: TaskState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(new_state) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: new_state.as_str().to_string(),
            });
        }
        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bypass the state machine. Used by the crash-recovery reconciliation
    /// pass, which may need to move a task out of `Running` without having
    /// observed the handler's own terminal transition.
    pub fn force_state(&mut self, new_state: TaskState) {
        if !self.state.can_transition_to(new_state) {
            tracing::warn!(
                task_id = %self.id,
                from = self.state.as_str(),
                to = new_state.as_str(),
                "forcing task state transition outside the normal state machine"
            );
        }
        self.state = new_state;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.retry_policy.max_attempts
    }

    /// Produce the retried follow-on task: same payload, `retry_count + 1`,
    /// delayed by the policy's back-off, looped back through `Rescheduled`.
    pub fn retry(&self, jitter: f64) -> Result<Self, DomainError> {
        if !self.can_retry() {
            return Err(DomainError::ValidationFailed(format!(
                "task {} has exhausted its retry policy ({} attempts)",
                self.id, self.retry_policy.max_attempts
            )));
        }
        let backoff = self.retry_policy.backoff_duration(self.retry_count, jitter);
        let now = Utc::now();
        let mut next = self.clone();
        next.state = TaskState::Scheduled;
        next.immediate = false;
        next.execute_time = now + chrono::Duration::from_std(backoff).unwrap_or_default();
        next.retry_count += 1;
        next.updated_at = now;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.immediate && self.execute_time < self.created_at {
            return Err(DomainError::ValidationFailed(
                "execute_time for a delayed task must not precede its creation time".to_string(),
            ));
        }
        if self.retry_count > self.retry_policy.max_attempts {
            return Err(DomainError::ValidationFailed(format!(
                "retry_count {} exceeds max_attempts {}",
                self.retry_count, self.retry_policy.max_attempts
            )));
        }
        Ok(())
    }

    /// Typed accessor for a string field in the opaque payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_pending_root() {
        let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.level, 0);
        assert!(task.parent_task_id.is_none());
        assert!(task.immediate);
    }

    #[test]
    fn chain_inherits_trace_and_increments_level() {
        let root = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        let child = root.chain(TaskType::FaultInjection, serde_json::json!({}));
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.group_id, root.group_id);
        assert_eq!(child.level, 1);
        assert_eq!(child.parent_task_id, Some(root.id));
    }

    #[test]
    fn reschedule_self_preserves_level_and_type() {
        let root = Task::new(TaskType::CronJob, serde_json::json!({}));
        let child = root.chain(TaskType::CronJob, serde_json::json!({}));
        let next = child.reschedule_self(serde_json::json!({}));
        assert_eq!(next.level, child.level);
        assert_eq!(next.task_type, TaskType::CronJob);
        assert_eq!(next.trace_id, child.trace_id);
        assert_eq!(next.parent_task_id, child.parent_task_id);
        assert_ne!(next.id, child.id);
    }

    #[test]
    fn valid_transitions_follow_state_machine() {
        let mut task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        assert!(task.transition_to(TaskState::Ready).is_ok());
        assert!(task.transition_to(TaskState::Running).is_ok());
        assert!(task.transition_to(TaskState::Completed).is_ok());
        assert!(task.transition_to(TaskState::Running).is_err());
    }

    #[test]
    fn rescheduled_loops_back_to_scheduled_only() {
        let state = TaskState::Rescheduled;
        assert!(state.can_transition_to(TaskState::Scheduled));
        assert!(!state.can_transition_to(TaskState::Running));
    }

    #[test]
    fn force_state_bypasses_but_warns() {
        let mut task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        task.state = TaskState::Running;
        task.force_state(TaskState::Pending);
        assert_eq!(task.state, TaskState::Pending);
    }

    #[test]
    fn retry_requires_capacity() {
        let mut task = Task::new(TaskType::RunAlgorithm, serde_json::json!({}));
        task.retry_policy = RetryPolicy::new(1, 1);
        task.retry_count = 1;
        assert!(!task.can_retry());
        assert!(task.retry(0.5).is_err());
    }

    #[test]
    fn retry_bumps_count_and_delays() {
        let task = Task::new(TaskType::RunAlgorithm, serde_json::json!({}));
        let retried = task.retry(0.5).expect("retry should succeed");
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.state, TaskState::Scheduled);
        assert!(!retried.immediate);
        assert!(retried.execute_time >= task.execute_time);
    }

    #[test]
    fn backoff_duration_is_capped() {
        let policy = RetryPolicy::new(10, 1);
        let low = policy.backoff_duration(0, 0.0);
        let high = policy.backoff_duration(10, 1.0);
        assert!(low.as_secs_f64() <= high.as_secs_f64());
        // exponent capped at 5, scale capped at 1.0, backoff_sec=1 => max 5s.
        assert!(high.as_secs_f64() <= 5.0 + f64::EPSILON);
    }

    #[test]
    fn validate_rejects_backdated_delayed_execute_time() {
        let mut task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        task.immediate = false;
        task.execute_time = task.created_at - chrono::Duration::seconds(10);
        assert!(task.validate().is_err());
    }

    #[test]
    fn task_type_round_trips_through_str() {
        for tt in [
            TaskType::RestartPedestal,
            TaskType::FaultInjection,
            TaskType::BuildDatapack,
            TaskType::RunAlgorithm,
            TaskType::CollectResult,
            TaskType::BuildContainer,
            TaskType::CronJob,
        ] {
            assert_eq!(TaskType::from_str(tt.as_str()), Some(tt));
        }
    }
}

//! Task store port (C1).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskState};

/// Filter criteria for `ListPaged`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub group_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// A page of tasks plus the cursor to fetch the next one, if any.
#[derive(Debug, Clone, Default)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub next_cursor: Option<Uuid>,
}

/// Durable record of every task: the source of truth for recovery.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert or update a task by id. Must be safe to call repeatedly with
    /// the same `task.id` and payload (idempotent submit).
    async fn upsert(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// All tasks sharing a `trace_id`, ordered by `level` then `created_at`.
    async fn list_by_trace(&self, trace_id: Uuid) -> DomainResult<Vec<Task>>;

    /// All tasks sharing a `group_id`.
    async fn list_by_group(&self, group_id: Uuid) -> DomainResult<Vec<Task>>;

    async fn list_paged(&self, filter: TaskFilter, cursor: Option<Uuid>, limit: u32) -> DomainResult<TaskPage>;

    /// Tasks in `Pending` or `Scheduled` state that are absent from both
    /// queues; used by the crash-recovery reconciliation pass.
    async fn list_by_state(&self, state: TaskState) -> DomainResult<Vec<Task>>;

    /// Mark a task archived without deleting its row (§4.1: never deleted).
    async fn archive(&self, id: Uuid) -> DomainResult<()>;
}

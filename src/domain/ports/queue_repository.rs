//! Queue layer port (C2): ready (FIFO) and delayed (sorted-by-execute-time)
//! tiers over the persisted task blob.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Task;

#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Push a task onto the tail of the ready queue.
    async fn push_ready(&self, task: &Task) -> DomainResult<()>;

    /// Block (up to `timeout`) for the next ready task, removing it from the
    /// queue. Returns `None` on timeout.
    async fn block_pop_ready(&self, timeout: std::time::Duration) -> DomainResult<Option<Task>>;

    /// Add a task to the delayed tier, scored by `task.execute_time`.
    async fn add_delayed(&self, task: &Task) -> DomainResult<()>;

    /// Atomically pop up to `limit` delayed tasks with `execute_time <= now`
    /// and push their blobs onto the ready queue, returning the task ids
    /// promoted.
    async fn pop_due(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Uuid>>;

    /// Remove a specific task from the ready queue (used when cancelling a
    /// task that is still queued).
    async fn remove_ready(&self, task_id: Uuid) -> DomainResult<bool>;

    /// Remove a specific task from the delayed queue.
    async fn remove_delayed(&self, task_id: Uuid) -> DomainResult<bool>;

    async fn ready_len(&self) -> DomainResult<u64>;

    async fn delayed_len(&self) -> DomainResult<u64>;
}

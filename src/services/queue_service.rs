//! `Submit` (§6): the single entry point that moves a task from "just
//! constructed" to "durable and queued." Persistence happens before the
//! queue push (§4.2 Failure) so a crash between the two is recovered by
//! reconciliation rather than losing the task outright.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskState};
use crate::domain::ports::{QueueRepository, TaskRepository};

pub struct QueueService {
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<dyn QueueRepository>,
}

impl QueueService {
    pub fn new(tasks: Arc<dyn TaskRepository>, queue: Arc<dyn QueueRepository>) -> Self {
        Self { tasks, queue }
    }

    /// Persist `task` and place it on the ready or delayed tier depending on
    /// `task.immediate`. Returns `(task_id, trace_id)`. Upserting by
    /// `task_id` makes resubmission with the same id a no-op beyond the
    /// state/queue placement, so callers may retry `submit` safely.
    #[instrument(skip(self, task), fields(task_id = %task.id, task_type = ?task.task_type))]
    pub async fn submit(&self, mut task: Task) -> DomainResult<(Uuid, Uuid)> {
        task.validate()?;

        if task.immediate {
            if task.state == TaskState::Pending {
                task.transition_to(TaskState::Ready)?;
            }
            self.tasks.upsert(&task).await?;
            self.queue.push_ready(&task).await?;
        } else {
            if task.state == TaskState::Pending || task.state == TaskState::Rescheduled {
                task.force_state(TaskState::Scheduled);
            }
            self.tasks.upsert(&task).await?;
            self.queue.add_delayed(&task).await?;
        }

        Ok((task.id, task.trace_id))
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Task> {
        self.tasks.get(id).await?.ok_or(DomainError::TaskNotFound(id))
    }

    pub async fn list_by_trace(&self, trace_id: Uuid) -> DomainResult<Vec<Task>> {
        self.tasks.list_by_trace(trace_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskType;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTaskRepository {
        tasks: Mutex<HashMap<Uuid, Task>>,
    }

    #[async_trait]
    impl TaskRepository for FakeTaskRepository {
        async fn upsert(&self, task: &Task) -> DomainResult<()> {
            self.tasks.lock().unwrap().insert(task.id, task.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
            Ok(self.tasks.lock().unwrap().get(&id).cloned())
        }
        async fn list_by_trace(&self, trace_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().values().filter(|t| t.trace_id == trace_id).cloned().collect())
        }
        async fn list_by_group(&self, group_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().values().filter(|t| t.group_id == group_id).cloned().collect())
        }
        async fn list_paged(
            &self,
            _filter: crate::domain::ports::TaskFilter,
            _cursor: Option<Uuid>,
            _limit: u32,
        ) -> DomainResult<crate::domain::ports::TaskPage> {
            unimplemented!("not exercised by these tests")
        }
        async fn list_by_state(&self, state: TaskState) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().values().filter(|t| t.state == state).cloned().collect())
        }
        async fn archive(&self, _id: Uuid) -> DomainResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQueueRepository {
        ready: Mutex<Vec<Uuid>>,
        delayed: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl QueueRepository for FakeQueueRepository {
        async fn push_ready(&self, task: &Task) -> DomainResult<()> {
            self.ready.lock().unwrap().push(task.id);
            Ok(())
        }
        async fn block_pop_ready(&self, _timeout: std::time::Duration) -> DomainResult<Option<Task>> {
            Ok(None)
        }
        async fn add_delayed(&self, task: &Task) -> DomainResult<()> {
            self.delayed.lock().unwrap().push(task.id);
            Ok(())
        }
        async fn pop_due(&self, _now: chrono::DateTime<chrono::Utc>, _limit: u32) -> DomainResult<Vec<Uuid>> {
            Ok(vec![])
        }
        async fn remove_ready(&self, _task_id: Uuid) -> DomainResult<bool> {
            Ok(false)
        }
        async fn remove_delayed(&self, _task_id: Uuid) -> DomainResult<bool> {
            Ok(false)
        }
        async fn ready_len(&self) -> DomainResult<u64> {
            Ok(self.ready.lock().unwrap().len() as u64)
        }
        async fn delayed_len(&self) -> DomainResult<u64> {
            Ok(self.delayed.lock().unwrap().len() as u64)
        }
    }

    fn service() -> (QueueService, Arc<FakeTaskRepository>, Arc<FakeQueueRepository>) {
        let tasks = Arc::new(FakeTaskRepository::default());
        let queue = Arc::new(FakeQueueRepository::default());
        (QueueService::new(tasks.clone(), queue.clone()), tasks, queue)
    }

    #[tokio::test]
    async fn immediate_task_goes_to_ready_with_state_ready() {
        let (service, tasks, queue) = service();
        let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        let (id, _trace) = service.submit(task).await.unwrap();

        assert_eq!(queue.ready.lock().unwrap().len(), 1);
        assert_eq!(queue.delayed.lock().unwrap().len(), 0);
        assert_eq!(tasks.tasks.lock().unwrap().get(&id).unwrap().state, TaskState::Ready);
    }

    #[tokio::test]
    async fn delayed_task_goes_to_delayed_with_state_scheduled() {
        let (service, tasks, queue) = service();
        let task = Task::new(TaskType::RunAlgorithm, serde_json::json!({}))
            .with_execute_time(chrono::Utc::now() + chrono::Duration::seconds(30));
        let (id, _trace) = service.submit(task).await.unwrap();

        assert_eq!(queue.delayed.lock().unwrap().len(), 1);
        assert_eq!(queue.ready.lock().unwrap().len(), 0);
        assert_eq!(tasks.tasks.lock().unwrap().get(&id).unwrap().state, TaskState::Scheduled);
    }

    #[tokio::test]
    async fn resubmitting_the_same_task_id_is_idempotent() {
        let (service, tasks, queue) = service();
        let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        service.submit(task.clone()).await.unwrap();
        service.submit(task.clone()).await.unwrap();

        assert_eq!(queue.ready.lock().unwrap().len(), 2);
        assert_eq!(tasks.tasks.lock().unwrap().len(), 1);
    }
}

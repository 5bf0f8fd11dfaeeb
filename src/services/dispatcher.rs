//! Dispatcher / worker pool (C6): a fixed-size pool of `tokio` tasks that
//! block on the ready queue, decode the popped blob, invoke the registered
//! [`StageHandler`] for its `task_type`, observe the result, update the
//! task record, and apply the retry/back-off state machine on failure.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{EventPayload, Task, TaskState};
use crate::domain::ports::{QueueRepository, TaskRepository};
use crate::services::handlers::{HandlerContext, HandlerRegistry};
use crate::services::retry_policy::{self, RetryDecision};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub workers: u32,
    pub pop_timeout: Duration,
    /// Upper bound on how long a single handler invocation may run before
    /// it is treated as a transient failure (§5 suspension points).
    pub task_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pop_timeout: Duration::from_secs(5),
            task_timeout: Duration::from_secs(900),
        }
    }
}

pub struct Dispatcher {
    tasks: Arc<dyn TaskRepository>,
    /// Held directly rather than reached through `ctx.queue`: `QueueService`
    /// only exposes `submit`/`get`/`list_by_trace`, not the blocking pop a
    /// worker loop needs.
    queue: Arc<dyn QueueRepository>,
    registry: Arc<HandlerRegistry>,
    ctx: Arc<HandlerContext>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<dyn QueueRepository>,
        registry: Arc<HandlerRegistry>,
        ctx: Arc<HandlerContext>,
        config: DispatcherConfig,
    ) -> Self {
        Self { tasks, queue, registry, ctx, config }
    }

    /// Spawn `config.workers` worker loops and block until `shutdown` fires,
    /// then wait for every worker to drain its in-flight task.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(workers = self.config.workers, "dispatcher starting");
        let mut handles = Vec::with_capacity(self.config.workers as usize);
        for worker_id in 0..self.config.workers {
            let dispatcher = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.worker_loop(worker_id, shutdown).await;
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "dispatcher worker task panicked");
            }
        }
        info!("dispatcher drained, all workers stopped");
    }

    async fn worker_loop(&self, worker_id: u32, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(worker_id, "worker shutting down");
                    return;
                }
                popped = self.queue.block_pop_ready(self.config.pop_timeout) => {
                    match popped {
                        Ok(Some(task)) => {
                            let trace_id = task.trace_id;
                            if let Err(err) = self.process_task(task).await {
                                warn!(worker_id, %trace_id, error = %err, "task processing failed");
                            }
                        }
                        Ok(None) => continue,
                        Err(err) => {
                            warn!(worker_id, error = %err, "ready queue pop failed");
                        }
                    }
                }
            }
        }
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, trace_id = %task.trace_id, task_type = ?task.task_type))]
    async fn process_task(&self, mut task: Task) -> Result<(), DomainError> {
        if task.state == TaskState::Cancelled {
            self.ctx
                .emit(&task, EventPayload::TaskStateUpdate { state: "cancelled".to_string(), message: None })
                .await?;
            return Ok(());
        }

        task.transition_to(TaskState::Running)?;
        self.tasks.upsert(&task).await?;
        self.ctx.emit(&task, EventPayload::TaskStarted).await?;

        let handler = self.registry.get(task.task_type);
        let outcome = tokio::time::timeout(self.config.task_timeout, handler.handle(&self.ctx, &task))
            .instrument(tracing::info_span!("handler", task_id = %task.id))
            .await;

        match outcome {
            Ok(Ok(())) => self.complete(task).await,
            Ok(Err(err)) => self.fail(task, err).await,
            Err(_elapsed) => {
                self.fail(task, DomainError::Transient(format!("handler timed out after {:?}", self.config.task_timeout)))
                    .await
            }
        }
    }

    async fn complete(&self, mut task: Task) -> Result<(), DomainError> {
        task.transition_to(TaskState::Completed)?;
        self.tasks.upsert(&task).await
    }

    /// Apply the retry/back-off policy (§4.6, §7.1): retryable errors with
    /// capacity remaining loop back through `Rescheduled` to `Scheduled`;
    /// everything else is terminal.
    async fn fail(&self, mut task: Task, err: DomainError) -> Result<(), DomainError> {
        let jitter: f64 = rand::rng().random();
        match retry_policy::classify(&err, &task, jitter) {
            RetryDecision::Retry { .. } => {
                task.transition_to(TaskState::Rescheduled)?;
                let retried = task.retry(jitter)?;
                self.tasks.upsert(&task).await?;
                self.ctx.queue.submit(retried).await?;
                Ok(())
            }
            RetryDecision::Exhausted | RetryDecision::Terminal => {
                task.error_message = Some(err.to_string());
                task.transition_to(TaskState::Error)?;
                self.tasks.upsert(&task).await?;
                self.ctx
                    .emit(
                        &task,
                        EventPayload::TaskStateUpdate { state: "error".to_string(), message: Some(err.to_string()) },
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Crash-recovery reconciliation (§4.2 Failure, §8 S6): tasks left in
    /// `Pending` or `Scheduled` that are absent from both queues (e.g. a
    /// crash between the Task Store upsert and the queue push) are
    /// re-queued if retry capacity remains, or marked `Error` otherwise.
    /// Intended to run once at startup before workers begin popping.
    pub async fn reconcile(&self) -> Result<usize, DomainError> {
        let mut requeued = 0usize;
        for state in [TaskState::Pending, TaskState::Scheduled, TaskState::Running] {
            for task in self.tasks.list_by_state(state).await? {
                if self.requeue_orphan(task).await? {
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }

    async fn requeue_orphan(&self, mut task: Task) -> Result<bool, DomainError> {
        if !task.can_retry() && task.state == TaskState::Running {
            task.force_state(TaskState::Error);
            task.error_message = Some("exhausted retry policy after crash recovery".to_string());
            self.tasks.upsert(&task).await?;
            self.ctx
                .emit(
                    &task,
                    EventPayload::TaskStateUpdate {
                        state: "error".to_string(),
                        message: task.error_message.clone(),
                    },
                )
                .await?;
            return Ok(false);
        }

        if task.state == TaskState::Running {
            task.force_state(TaskState::Pending);
        }
        self.ctx.queue.submit(task).await?;
        Ok(true)
    }

    /// Mark a task `Cancelled` out of band (not exercised by the dispatcher
    /// loop itself, but the operation the state machine's `Cancelled`
    /// transition implies is available for an API layer to call).
    pub async fn cancel(&self, task_id: Uuid) -> Result<(), DomainError> {
        let mut task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        task.transition_to(TaskState::Cancelled)?;
        self.tasks.upsert(&task).await
    }
}

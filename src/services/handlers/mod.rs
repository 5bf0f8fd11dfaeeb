//! Stage handlers (C7): one `StageHandler` implementation per `TaskType`,
//! registered in a `HandlerRegistry` keyed by the closed enum so an
//! unregistered variant is a compile error (§9.1), not a runtime lookup
//! miss.

mod build_container;
mod build_datapack;
mod collect_result;
mod cron_job;
mod fault_injection;
mod restart_pedestal;
mod run_algorithm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::sqlite::CronScheduleStore;
use crate::domain::errors::DomainResult;
use crate::domain::models::{EventPayload, Task, TaskType};
use crate::domain::ports::{ClusterGateway, JobWatcher};
use crate::services::config::Config;
use crate::services::event_store::EventStore;
use crate::services::namespace_monitor::NamespaceMonitor;
use crate::services::queue_service::QueueService;
use crate::services::token_bucket_service::TokenBucketService;

/// Everything a handler needs beyond its own task: the follow-on submit
/// path, the event log, the two shared limiters, and the cluster-facing
/// collaborators (§4.7 points 1-5).
pub struct HandlerContext {
    pub queue: Arc<QueueService>,
    pub events: Arc<dyn EventStore>,
    pub tokens: Arc<TokenBucketService>,
    pub namespaces: Arc<NamespaceMonitor>,
    pub cluster: Arc<dyn ClusterGateway>,
    pub jobs: Arc<dyn JobWatcher>,
    pub schedules: Arc<CronScheduleStore>,
    pub config: Arc<Config>,
}

impl HandlerContext {
    pub async fn emit(&self, task: &Task, payload: EventPayload) -> DomainResult<()> {
        self.events
            .append(task.trace_id, task.id, task.task_type, payload)
            .await
            .map_err(|e| crate::domain::errors::DomainError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub fn token_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.config.rate_limiting.token_wait_timeout_secs)
    }
}

/// Shared skeleton (§4.7): acquire a rate-limit token, perform the stage
/// work, and report whether it was acquired. Handlers that don't gate on a
/// bucket (e.g. `CronJob`) skip this.
pub async fn acquire_token_or_reschedule(
    ctx: &HandlerContext,
    task: &Task,
    bucket: &str,
    capacity: u32,
) -> DomainResult<bool> {
    let acquired = ctx
        .tokens
        .wait_for_token(bucket, task.id, capacity, ctx.token_wait_timeout())
        .await?;
    if !acquired {
        ctx.emit(task, EventPayload::NoTokenAvailable { bucket: bucket.to_string() }).await?;
    }
    Ok(acquired)
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()>;
}

pub struct HandlerRegistry {
    restart_pedestal: restart_pedestal::RestartPedestalHandler,
    fault_injection: fault_injection::FaultInjectionHandler,
    build_datapack: build_datapack::BuildDatapackHandler,
    run_algorithm: run_algorithm::RunAlgorithmHandler,
    collect_result: collect_result::CollectResultHandler,
    build_container: build_container::BuildContainerHandler,
    cron_job: cron_job::CronJobHandler,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            restart_pedestal: restart_pedestal::RestartPedestalHandler,
            fault_injection: fault_injection::FaultInjectionHandler,
            build_datapack: build_datapack::BuildDatapackHandler,
            run_algorithm: run_algorithm::RunAlgorithmHandler,
            collect_result: collect_result::CollectResultHandler,
            build_container: build_container::BuildContainerHandler,
            cron_job: cron_job::CronJobHandler,
        }
    }
}

impl HandlerRegistry {
    pub fn get(&self, task_type: TaskType) -> &dyn StageHandler {
        match task_type {
            TaskType::RestartPedestal => &self.restart_pedestal,
            TaskType::FaultInjection => &self.fault_injection,
            TaskType::BuildDatapack => &self.build_datapack,
            TaskType::RunAlgorithm => &self.run_algorithm,
            TaskType::CollectResult => &self.collect_result,
            TaskType::BuildContainer => &self.build_container,
            TaskType::CronJob => &self.cron_job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_task_type() {
        let registry = HandlerRegistry::default();
        for task_type in [
            TaskType::RestartPedestal,
            TaskType::FaultInjection,
            TaskType::BuildDatapack,
            TaskType::RunAlgorithm,
            TaskType::CollectResult,
            TaskType::BuildContainer,
            TaskType::CronJob,
        ] {
            let _handler = registry.get(task_type);
        }
    }
}

/// Shared `HandlerContext` builder for handler tests. SQLite-backed
/// throughout (an in-memory migrated pool): `TaskRepository`,
/// `QueueRepository`, `NamespaceRepository` and `TokenBucketRepository`
/// have no in-memory fakes of their own, only `ClusterGateway` and
/// `JobWatcher` do.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::adapters::sqlite::{
        create_migrated_test_pool, CronScheduleStore, SqliteNamespaceRepository, SqliteQueueRepository,
        SqliteTaskRepository, SqliteTokenBucketRepository,
    };
    use crate::domain::ports::{FakeClusterGateway, FakeJobWatcher};
    use crate::services::config::Config;
    use crate::services::event_store::InMemoryEventStore;
    use crate::services::namespace_monitor::NamespaceMonitor;
    use crate::services::queue_service::QueueService;
    use crate::services::token_bucket_service::TokenBucketService;

    use super::HandlerContext;

    pub(crate) async fn build_ctx() -> (HandlerContext, Arc<FakeClusterGateway>, Arc<FakeJobWatcher>) {
        let pool = create_migrated_test_pool().await.expect("migrated test pool");

        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let queue_repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
        let namespaces_repo = Arc::new(SqliteNamespaceRepository::new(pool.clone()));
        let tokens_repo = Arc::new(SqliteTokenBucketRepository::new(pool.clone()));
        let schedules = Arc::new(CronScheduleStore::new(pool));

        let cluster = Arc::new(FakeClusterGateway::new());
        let jobs = Arc::new(FakeJobWatcher::new());

        let ctx = HandlerContext {
            queue: Arc::new(QueueService::new(tasks, queue_repo)),
            events: Arc::new(InMemoryEventStore::default()),
            tokens: Arc::new(TokenBucketService::with_defaults(tokens_repo)),
            namespaces: Arc::new(NamespaceMonitor::with_defaults(namespaces_repo)),
            cluster: cluster.clone(),
            jobs: jobs.clone(),
            schedules,
            config: Arc::new(Config::default()),
        };

        (ctx, cluster, jobs)
    }
}

//! `RestartPedestal` handler (§4.7): reserves a namespace ending at
//! `now + interval`, installs the pedestal, and chains `FaultInjection` for
//! the tail of the reserved window.

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventPayload, Task, TaskType};

use super::{acquire_token_or_reschedule, HandlerContext, StageHandler};

pub struct RestartPedestalHandler;

#[async_trait]
impl StageHandler for RestartPedestalHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let prefix = task.payload_str("prefix").unwrap_or("ts").to_string();
        let benchmark = task.payload_str("benchmark").unwrap_or("sock-shop").to_string();
        let interval_secs = task.payload.get("interval_secs").and_then(|v| v.as_u64()).unwrap_or(600);
        let fault_duration_secs = task.payload.get("fault_duration_secs").and_then(|v| v.as_u64()).unwrap_or(60);
        let chaos_spec = task.payload.get("chaos_spec").cloned().unwrap_or(serde_json::json!({}));
        let has_datapack = task.payload.get("has_datapack").and_then(|v| v.as_bool()).unwrap_or(true);
        let algorithms = task
            .payload
            .get("algorithms")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
            .unwrap_or_default();

        if !acquire_token_or_reschedule(ctx, task, "restart_pedestal", ctx.config.rate_limiting.max_concurrent_restarts).await? {
            return Err(DomainError::RateLimited { bucket: "restart_pedestal".to_string() });
        }

        let (count, _pattern) = ctx
            .config
            .namespace_pool(&prefix)
            .ok_or_else(|| DomainError::ValidationFailed(format!("no namespace pool configured for prefix {prefix}")))?;

        let hold_until = Utc::now() + chrono::Duration::seconds(interval_secs as i64);
        let namespace = ctx
            .namespaces
            .wait_for_namespace(&prefix, count, task.trace_id, hold_until, ctx.token_wait_timeout())
            .await?;

        let Some(namespace) = namespace else {
            ctx.tokens.release("restart_pedestal", task.id).await?;
            ctx.emit(task, EventPayload::NoNamespaceAvailable { prefix: prefix.clone() }).await?;
            return Err(DomainError::NamespaceUnavailable { prefix });
        };

        ctx.emit(task, EventPayload::RestartPedestalStarted { namespace: namespace.clone() }).await?;

        let install_result = ctx.cluster.install_pedestal(&namespace, &benchmark).await;
        ctx.tokens.release("restart_pedestal", task.id).await?;

        if let Err(err) = install_result {
            ctx.emit(
                task,
                EventPayload::RestartPedestalFailed { namespace: namespace.clone(), error: err.to_string() },
            )
            .await?;
            return Err(err);
        }

        ctx.emit(task, EventPayload::RestartPedestalCompleted { namespace: namespace.clone() }).await?;

        let fault_duration = fault_duration_secs.min(interval_secs);
        let inject_at = Utc::now() + chrono::Duration::seconds((interval_secs - fault_duration) as i64);
        let inject_payload = serde_json::json!({
            "namespace": namespace,
            "chaos_spec": chaos_spec,
            "fault_duration_secs": fault_duration_secs,
            "has_datapack": has_datapack,
            "algorithms": algorithms,
        });
        let next = task.chain(TaskType::FaultInjection, inject_payload).with_execute_time(inject_at);
        ctx.queue.submit(next).await?;

        Ok(())
    }
}

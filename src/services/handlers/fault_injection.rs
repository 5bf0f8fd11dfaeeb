//! `FaultInjection` handler (§4.7): applies a chaos specification to a
//! namespace for `fault_duration`, then chains `BuildDatapack` when a
//! datapack is configured, or leaves the trace to end here otherwise.

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventPayload, Task, TaskType};

use super::{HandlerContext, StageHandler};

pub struct FaultInjectionHandler;

#[async_trait]
impl StageHandler for FaultInjectionHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let namespace = task.payload_str("namespace").unwrap_or_default().to_string();
        let chaos_spec = task.payload.get("chaos_spec").cloned().unwrap_or(serde_json::json!({}));
        let fault_duration_secs = task.payload.get("fault_duration_secs").and_then(|v| v.as_u64()).unwrap_or(60);
        let has_datapack = task.payload.get("has_datapack").and_then(|v| v.as_bool()).unwrap_or(true);
        let algorithms = task.payload.get("algorithms").cloned().unwrap_or(serde_json::json!([]));

        ctx.emit(task, EventPayload::FaultInjectionStarted).await?;

        let duration = std::time::Duration::from_secs(fault_duration_secs);
        let result = ctx.cluster.inject_fault(&namespace, &chaos_spec, duration).await;

        if let Err(err) = result {
            ctx.emit(task, EventPayload::FaultInjectionFailed { error: err.to_string() }).await?;
            return Err(err);
        }

        let injection_end = Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
        ctx.emit(task, EventPayload::FaultInjectionCompleted { injection_end }).await?;

        if !has_datapack {
            return Ok(());
        }

        let datapack_payload = serde_json::json!({
            "namespace": namespace,
            "algorithms": algorithms,
        });
        let next = task.chain(TaskType::BuildDatapack, datapack_payload);
        ctx.queue.submit(next).await?;

        Ok(())
    }
}

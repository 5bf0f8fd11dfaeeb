//! `BuildDatapack` handler (§4.7): collects observability artefacts into a
//! datapack, then fans out one `RunAlgorithm` task per registered
//! algorithm.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventPayload, Task, TaskType};

use super::{HandlerContext, StageHandler};

pub struct BuildDatapackHandler;

#[async_trait]
impl StageHandler for BuildDatapackHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let namespace = task.payload_str("namespace").unwrap_or_default().to_string();
        let algorithms = task
            .payload
            .get("algorithms")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
            .unwrap_or_default();

        ctx.emit(task, EventPayload::DatapackBuildStarted).await?;

        let datapack = match ctx.cluster.collect_datapack(&namespace).await {
            Ok(datapack) => datapack,
            Err(err) => {
                ctx.emit(task, EventPayload::DatapackBuildFailed { error: err.to_string() }).await?;
                return Err(err);
            }
        };
        ctx.emit(task, EventPayload::DatapackBuildSucceed { datapack_id: datapack.datapack_id }).await?;

        for algorithm in algorithms {
            let job_name = format!("rca-{}-{}", task.trace_id, algorithm);
            let run_payload = serde_json::json!({
                "datapack_id": datapack.datapack_id,
                "algorithm": algorithm,
                "job_name": job_name,
                "has_detector_data": datapack.has_detector_data,
            });
            let next = task.chain(TaskType::RunAlgorithm, run_payload);
            ctx.queue.submit(next).await?;
        }

        Ok(())
    }
}

//! `CollectResult` handler (§4.7): reads an algorithm's output artefact and
//! classifies it as anomaly, no-anomaly, or missing-detector-data. Terminal
//! for the trace either way — nothing chains after this stage.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EventPayload, Task};

use super::{HandlerContext, StageHandler};

pub struct CollectResultHandler;

#[async_trait]
impl StageHandler for CollectResultHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let job_name = task.payload_str("job_name").unwrap_or_default().to_string();
        let has_detector_data = task.payload.get("has_detector_data").and_then(|v| v.as_bool()).unwrap_or(true);

        if !has_detector_data {
            ctx.emit(task, EventPayload::DatapackNoDetectorData).await?;
            return Ok(());
        }

        let result = ctx.cluster.read_algorithm_result(&job_name).await?;

        if result.anomaly {
            ctx.emit(
                task,
                EventPayload::DatapackResultCollection {
                    anomaly: true,
                    result_ref: result.result_ref,
                },
            )
            .await?;
        } else {
            ctx.emit(task, EventPayload::DatapackNoAnomaly).await?;
        }

        Ok(())
    }
}

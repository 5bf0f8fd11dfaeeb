//! `RunAlgorithm` handler (§4.7): launches an RCA algorithm container job
//! and waits for the `JobWatcher` to deliver its terminal outcome.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventPayload, Task, TaskType};
use crate::domain::ports::JobOutcome;

use super::{acquire_token_or_reschedule, HandlerContext, StageHandler};

/// How long to wait for the job watcher to report a terminal outcome before
/// treating the wait as a transient failure, same bound as the other
/// long-running cluster RPCs in §5.
const JOB_WAIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(600);

pub struct RunAlgorithmHandler;

#[async_trait]
impl StageHandler for RunAlgorithmHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let datapack_id = task
            .payload
            .get("datapack_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| DomainError::ValidationFailed("missing datapack_id".to_string()))?;
        let algorithm = task.payload_str("algorithm").unwrap_or_default().to_string();
        let job_name = task.payload_str("job_name").unwrap_or_default().to_string();
        let has_detector_data = task.payload.get("has_detector_data").and_then(|v| v.as_bool()).unwrap_or(true);

        if !acquire_token_or_reschedule(ctx, task, "run_algorithm", ctx.config.rate_limiting.max_concurrent_algo_execution).await? {
            return Err(DomainError::RateLimited { bucket: "run_algorithm".to_string() });
        }

        ctx.emit(task, EventPayload::AlgoRunStarted { job_name: job_name.clone() }).await?;

        if let Err(err) = ctx.cluster.launch_algorithm_job(&job_name, &algorithm, datapack_id).await {
            ctx.tokens.release("run_algorithm", task.id).await?;
            ctx.emit(task, EventPayload::AlgoRunFailed { job_name: job_name.clone(), error: err.to_string() }).await?;
            return Err(err);
        }

        let outcome = ctx.jobs.await_job(&job_name, JOB_WAIT_TIMEOUT).await;
        ctx.tokens.release("run_algorithm", task.id).await?;

        match outcome {
            Some(JobOutcome::Succeed { logs_ref }) => {
                ctx.emit(task, EventPayload::JobSucceed { job_name: job_name.clone(), logs_ref }).await?;
                ctx.emit(task, EventPayload::AlgoRunSucceed { job_name: job_name.clone() }).await?;

                let collect_payload = serde_json::json!({
                    "job_name": job_name,
                    "algorithm": algorithm,
                    "has_detector_data": has_detector_data,
                });
                let next = task.chain(TaskType::CollectResult, collect_payload);
                ctx.queue.submit(next).await?;
                Ok(())
            }
            Some(JobOutcome::Failed { error, logs_ref }) => {
                ctx.emit(task, EventPayload::JobFailed { job_name: job_name.clone(), error: error.clone(), logs_ref }).await?;
                ctx.emit(task, EventPayload::AlgoRunFailed { job_name, error: error.clone() }).await?;
                Err(DomainError::Transient(error))
            }
            None => {
                ctx.emit(
                    task,
                    EventPayload::AlgoRunFailed { job_name: job_name.clone(), error: "job watcher timed out".to_string() },
                )
                .await?;
                Err(DomainError::Transient(format!("timed out waiting for job {job_name}")))
            }
        }
    }
}

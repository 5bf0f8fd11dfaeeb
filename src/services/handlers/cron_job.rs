//! `CronJob` handler (§4.7, §8 S4): a recurring trigger. Each fire resubmits
//! the next occurrence *before* doing any triggered work, so a failure in
//! this occurrence's work never cancels the schedule — only the
//! occurrence-record for this fire is marked `Error`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskType};

use super::{HandlerContext, StageHandler};

pub struct CronJobHandler;

#[async_trait]
impl StageHandler for CronJobHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> DomainResult<()> {
        let cron_expression = task
            .payload_str("cron_expression")
            .ok_or_else(|| DomainError::ValidationFailed("cron_job payload missing cron_expression".to_string()))?
            .to_string();

        // The `cron` crate expects a leading seconds field; the distilled
        // spec's examples (`*/5 * * * *`) are the standard 5-field form, so
        // fall back to prefixing a `0` seconds field when the bare
        // expression doesn't parse.
        let schedule = cron::Schedule::from_str(&cron_expression)
            .or_else(|_| cron::Schedule::from_str(&format!("0 {cron_expression}")))
            .map_err(|e| DomainError::ValidationFailed(format!("invalid cron expression '{cron_expression}': {e}")))?;
        let next_fire = schedule
            .after(&Utc::now())
            .next()
            .ok_or_else(|| DomainError::ValidationFailed(format!("cron expression '{cron_expression}' has no future occurrence")))?;

        let next_occurrence = task.reschedule_self(task.payload.clone()).with_execute_time(next_fire);
        ctx.schedules.upsert(task.trace_id, &cron_expression, next_fire).await?;
        ctx.queue.submit(next_occurrence).await?;

        // The schedule for the next occurrence is now durable regardless of
        // what happens below, matching §8 S4's "failure does not cancel
        // future occurrences."
        if let Some(trigger_type) = task.payload_str("trigger_task_type") {
            let trigger_type = TaskType::from_str(trigger_type)
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown trigger_task_type '{trigger_type}'")))?;
            let trigger_payload = task.payload.get("trigger_payload").cloned().unwrap_or(serde_json::json!({}));
            let triggered = task.chain(trigger_type, trigger_payload);
            ctx.queue.submit(triggered).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_five_minutes_has_a_future_occurrence() {
        let schedule = cron::Schedule::from_str("0 */5 * * * *").expect("valid cron expression");
        assert!(schedule.after(&Utc::now()).next().is_some());
    }

    #[test]
    fn malformed_expression_does_not_parse() {
        assert!(cron::Schedule::from_str("not a cron expression").is_err());
    }
}

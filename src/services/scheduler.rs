//! Scheduler (C5): the single background task that promotes due delayed
//! tasks to ready. It never executes task logic itself — only shuffles
//! blobs between queue tiers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::ports::QueueRepository;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub batch_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            batch_size: 100,
        }
    }
}

pub struct Scheduler {
    queue: Arc<dyn QueueRepository>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(queue: Arc<dyn QueueRepository>, config: SchedulerConfig) -> Self {
        Self { queue, config }
    }

    pub fn with_defaults(queue: Arc<dyn QueueRepository>) -> Self {
        Self::new(queue, SchedulerConfig::default())
    }

    /// One promotion pass: `pop_due(now, batch_size)`. Returns the number of
    /// tasks promoted, for callers (notably tests) that want to assert
    /// promotion happened without waiting a full tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> crate::domain::errors::DomainResult<usize> {
        let promoted = self.queue.pop_due(chrono::Utc::now(), self.config.batch_size).await?;
        Ok(promoted.len())
    }

    /// Run until `shutdown` fires, ticking at `tick_interval`.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.config.tick_interval.as_secs(), "scheduler starting");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.config.tick_interval) => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "scheduler tick failed");
                    }
                }
            }
        }
    }
}

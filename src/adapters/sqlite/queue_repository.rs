//! SQLite-backed `QueueRepository` (C2): `queue_ready` is an ordered list via
//! an autoincrement sequence column, `queue_delayed` is scored by
//! `execute_time`. `block_pop_ready` polls on an interval since SQLite has
//! no native blocking-pop primitive — the same trade-off the corpus makes
//! for its other poll-with-timeout services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Task;
use crate::domain::ports::QueueRepository;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn try_pop_ready(&self) -> DomainResult<Option<Task>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT task_id, task_blob FROM queue_ready ORDER BY seq ASC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let task_id: String = row.try_get("task_id")?;
        let blob: String = row.try_get("task_blob")?;
        sqlx::query("DELETE FROM queue_ready WHERE task_id = ?")
            .bind(&task_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(serde_json::from_str(&blob)?))
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn push_ready(&self, task: &Task) -> DomainResult<()> {
        let blob = serde_json::to_string(task)?;
        sqlx::query(
            "INSERT INTO queue_ready (task_id, task_blob, enqueued_at) VALUES (?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET task_blob = excluded.task_blob",
        )
        .bind(task.id.to_string())
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn block_pop_ready(&self, timeout: Duration) -> DomainResult<Option<Task>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.try_pop_ready().await? {
                return Ok(Some(task));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn add_delayed(&self, task: &Task) -> DomainResult<()> {
        let blob = serde_json::to_string(task)?;
        sqlx::query(
            "INSERT INTO queue_delayed (task_id, task_blob, execute_time) VALUES (?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET task_blob = excluded.task_blob, execute_time = excluded.execute_time",
        )
        .bind(task.id.to_string())
        .bind(blob)
        .bind(task.execute_time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pop_due(&self, now: DateTime<Utc>, limit: u32) -> DomainResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            "SELECT task_id, task_blob FROM queue_delayed WHERE execute_time <= ? ORDER BY execute_time ASC LIMIT ?",
        )
        .bind(now.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut promoted = Vec::with_capacity(rows.len());
        for row in &rows {
            let task_id: String = row.try_get("task_id")?;
            let blob: String = row.try_get("task_blob")?;
            sqlx::query("DELETE FROM queue_delayed WHERE task_id = ?")
                .bind(&task_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO queue_ready (task_id, task_blob, enqueued_at) VALUES (?, ?, ?)
                 ON CONFLICT(task_id) DO UPDATE SET task_blob = excluded.task_blob",
            )
            .bind(&task_id)
            .bind(&blob)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            promoted.push(Uuid::parse_str(&task_id).map_err(|e| {
                crate::domain::errors::DomainError::SerializationError(e.to_string())
            })?);
        }
        tx.commit().await?;
        Ok(promoted)
    }

    async fn remove_ready(&self, task_id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM queue_ready WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_delayed(&self, task_id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM queue_delayed WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ready_len(&self) -> DomainResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_ready")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn delayed_len(&self) -> DomainResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_delayed")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::TaskType;

    async fn repo() -> SqliteQueueRepository {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        SqliteQueueRepository::new(pool)
    }

    #[tokio::test]
    async fn ready_queue_is_fifo() {
        let repo = repo().await;
        let first = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        let second = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        repo.push_ready(&first).await.unwrap();
        repo.push_ready(&second).await.unwrap();

        let popped = repo.block_pop_ready(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(popped.id, first.id);
    }

    #[tokio::test]
    async fn block_pop_ready_times_out_cleanly_when_empty() {
        let repo = repo().await;
        let popped = repo.block_pop_ready(Duration::from_millis(50)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn pop_due_promotes_only_tasks_at_or_before_now() {
        let repo = repo().await;
        let now = Utc::now();
        let due = Task::new(TaskType::RunAlgorithm, serde_json::json!({})).with_execute_time(now - chrono::Duration::seconds(1));
        let future = Task::new(TaskType::RunAlgorithm, serde_json::json!({})).with_execute_time(now + chrono::Duration::hours(1));
        repo.add_delayed(&due).await.unwrap();
        repo.add_delayed(&future).await.unwrap();

        let promoted = repo.pop_due(now, 100).await.unwrap();
        assert_eq!(promoted, vec![due.id]);
        assert_eq!(repo.delayed_len().await.unwrap(), 1);
        assert_eq!(repo.ready_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delayed_queue_empty_tick_is_a_no_op() {
        let repo = repo().await;
        let promoted = repo.pop_due(Utc::now(), 100).await.unwrap();
        assert!(promoted.is_empty());
    }

    #[tokio::test]
    async fn remove_ready_drops_a_specific_task() {
        let repo = repo().await;
        let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
        repo.push_ready(&task).await.unwrap();
        assert!(repo.remove_ready(task.id).await.unwrap());
        assert_eq!(repo.ready_len().await.unwrap(), 0);
    }
}

//! `task_schedules` bookkeeping for the `CronJob` stage handler (§4.7).
//!
//! Not a hexagonal port: nothing outside the `CronJob` handler needs to see
//! a recurring task's next fire time, so this is a plain SQLite-backed
//! struct rather than a `domain::ports` trait + fake pair.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::parse_datetime;
use crate::domain::errors::DomainResult;

pub struct CronScheduleStore {
    pool: SqlitePool,
}

pub struct CronSchedule {
    pub cron_expression: String,
    pub next_fire_time: DateTime<Utc>,
}

impl CronScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        task_id: Uuid,
        cron_expression: &str,
        next_fire_time: DateTime<Utc>,
    ) -> DomainResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO task_schedules (task_id, cron_expression, next_fire_time, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                cron_expression = excluded.cron_expression,
                next_fire_time = excluded.next_fire_time,
                updated_at = excluded.updated_at",
        )
        .bind(task_id.to_string())
        .bind(cron_expression)
        .bind(next_fire_time.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, task_id: Uuid) -> DomainResult<Option<CronSchedule>> {
        let row = sqlx::query("SELECT cron_expression, next_fire_time FROM task_schedules WHERE task_id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(CronSchedule {
            cron_expression: row.try_get("cron_expression")?,
            next_fire_time: parse_datetime(&row.try_get::<String, _>("next_fire_time")?)?,
        }))
    }

    pub async fn delete(&self, task_id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM task_schedules WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        let store = CronScheduleStore::new(pool);
        let task_id = Uuid::new_v4();
        let next_fire = Utc::now() + chrono::Duration::minutes(5);

        store.upsert(task_id, "*/5 * * * *", next_fire).await.unwrap();
        let schedule = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(schedule.cron_expression, "*/5 * * * *");
        assert_eq!(schedule.next_fire_time.timestamp(), next_fire.timestamp());
    }

    #[tokio::test]
    async fn repeated_upsert_overwrites_next_fire_time() {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        let store = CronScheduleStore::new(pool);
        let task_id = Uuid::new_v4();
        let first = Utc::now() + chrono::Duration::minutes(5);
        let second = first + chrono::Duration::minutes(5);

        store.upsert(task_id, "*/5 * * * *", first).await.unwrap();
        store.upsert(task_id, "*/5 * * * *", second).await.unwrap();

        let schedule = store.get(task_id).await.unwrap().unwrap();
        assert_eq!(schedule.next_fire_time.timestamp(), second.timestamp());
    }

    #[tokio::test]
    async fn delete_removes_the_schedule() {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        let store = CronScheduleStore::new(pool);
        let task_id = Uuid::new_v4();
        store.upsert(task_id, "0 * * * *", Utc::now()).await.unwrap();
        store.delete(task_id).await.unwrap();
        assert!(store.get(task_id).await.unwrap().is_none());
    }
}

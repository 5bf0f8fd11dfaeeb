//! SQLite-backed `TokenBucketRepository` (C3). Stale members (older than
//! `ttl`) are reaped inside the same transaction as the capacity check, so a
//! crashed holder's slot is reclaimed without a separate sweep.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::parse_uuid;
use crate::domain::errors::DomainResult;
use crate::domain::ports::TokenBucketRepository;

pub struct SqliteTokenBucketRepository {
    pool: SqlitePool,
}

impl SqliteTokenBucketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenBucketRepository for SqliteTokenBucketRepository {
    async fn acquire(
        &self,
        bucket: &str,
        holder: Uuid,
        capacity: u32,
        ttl: std::time::Duration,
    ) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let stale_before = now - chrono::Duration::from_std(ttl).unwrap_or_default();

        sqlx::query("DELETE FROM token_bucket_members WHERE bucket = ? AND acquired_at < ?")
            .bind(bucket)
            .bind(stale_before.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM token_bucket_members WHERE bucket = ?")
            .bind(bucket)
            .fetch_one(&mut *tx)
            .await?;
        let current: i64 = row.try_get("n")?;

        if current as u32 >= capacity {
            tx.commit().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO token_bucket_members (bucket, holder, acquired_at) VALUES (?, ?, ?)
             ON CONFLICT(bucket, holder) DO UPDATE SET acquired_at = excluded.acquired_at",
        )
        .bind(bucket)
        .bind(holder.to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn release(&self, bucket: &str, holder: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM token_bucket_members WHERE bucket = ? AND holder = ?")
            .bind(bucket)
            .bind(holder.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn member_count(&self, bucket: &str, ttl: std::time::Duration) -> DomainResult<u32> {
        let stale_before = Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_default();
        sqlx::query("DELETE FROM token_bucket_members WHERE bucket = ? AND acquired_at < ?")
            .bind(bucket)
            .bind(stale_before.to_rfc3339())
            .execute(&self.pool)
            .await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM token_bucket_members WHERE bucket = ?")
            .bind(bucket)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u32)
    }

    async fn inspect(&self) -> DomainResult<Vec<(String, Uuid)>> {
        let rows = sqlx::query("SELECT bucket, holder FROM token_bucket_members")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok((row.try_get("bucket")?, parse_uuid(&row.try_get::<String, _>("holder")?)?)))
            .collect()
    }
}

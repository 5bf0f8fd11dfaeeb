//! SQLite-backed `NamespaceRepository` (C4).
//!
//! Acquisition is serialised per namespace by a short-lived SQLite
//! transaction rather than an in-process keyed mutex, so it stays correct
//! across multiple workers inside the one active orchestrator process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::parse_datetime;
use crate::domain::errors::DomainResult;
use crate::domain::models::{namespace_name, NamespaceReservation};
use crate::domain::ports::NamespaceRepository;

pub struct SqliteNamespaceRepository {
    pool: SqlitePool,
}

impl SqliteNamespaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NamespaceRepository for SqliteNamespaceRepository {
    async fn get_namespace_to_restart(
        &self,
        prefix: &str,
        count: u32,
        trace_id: Uuid,
        now: DateTime<Utc>,
        hold_until: DateTime<Utc>,
    ) -> DomainResult<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let held_rows = sqlx::query(
            "SELECT namespace, start, hold_until FROM namespace_reservations
             WHERE trace_id = ? AND start <= ? AND ? < hold_until",
        )
        .bind(trace_id.to_string())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_all(&mut *tx)
        .await?;
        for row in &held_rows {
            let namespace: String = row.try_get("namespace")?;
            if namespace.starts_with(prefix) {
                tx.commit().await?;
                return Ok(Some(namespace));
            }
        }

        for idx in 0..count {
            let candidate = namespace_name(prefix, idx);
            let rows = sqlx::query("SELECT start, hold_until FROM namespace_reservations WHERE namespace = ?")
                .bind(&candidate)
                .fetch_all(&mut *tx)
                .await?;

            let mut conflict = false;
            for row in &rows {
                let start = parse_datetime(&row.try_get::<String, _>("start")?)?;
                let existing_hold_until = parse_datetime(&row.try_get::<String, _>("hold_until")?)?;
                if start < hold_until && now < existing_hold_until {
                    conflict = true;
                    break;
                }
            }
            if conflict {
                continue;
            }

            sqlx::query(
                "INSERT INTO namespace_reservations (namespace, trace_id, start, hold_until) VALUES (?, ?, ?, ?)
                 ON CONFLICT(namespace, trace_id) DO UPDATE SET start = excluded.start, hold_until = excluded.hold_until",
            )
            .bind(&candidate)
            .bind(trace_id.to_string())
            .bind(now.to_rfc3339())
            .bind(hold_until.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(Some(candidate));
        }

        tx.commit().await?;
        Ok(None)
    }

    async fn release_lock(&self, namespace: &str, trace_id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM namespace_reservations WHERE namespace = ? AND trace_id = ?")
            .bind(namespace)
            .bind(trace_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn inspect_lock(&self) -> DomainResult<Vec<NamespaceReservation>> {
        let rows = sqlx::query("SELECT namespace, trace_id, start, hold_until FROM namespace_reservations")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(NamespaceReservation {
                    namespace: row.try_get("namespace")?,
                    trace_id: crate::adapters::sqlite::parse_uuid(&row.try_get::<String, _>("trace_id")?)?,
                    start: parse_datetime(&row.try_get::<String, _>("start")?)?,
                    hold_until: parse_datetime(&row.try_get::<String, _>("hold_until")?)?,
                })
            })
            .collect()
    }
}

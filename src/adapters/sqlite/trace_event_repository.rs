//! SQLite-backed `EventStore` (C8): `trace_events` is keyed by
//! `(trace_id, id)`, with `id` a per-trace monotonic sequence assigned
//! inside the append transaction (`MAX(id) + 1`, not an autoincrement
//! rowid) so resumption via `after_id` is well-defined per trace.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::models::{TaskType, TraceEvent};
use crate::services::event_store::{EventQuery, EventStore, EventStoreError};

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<TraceEvent, EventStoreError> {
    let task_type_str: String = row.try_get("task_type").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
    let task_type = TaskType::from_str(&task_type_str)
        .ok_or_else(|| EventStoreError::DatabaseError(format!("unknown task_type '{task_type_str}'")))?;
    let payload_str: String = row.try_get("payload").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
    let payload = serde_json::from_str(&payload_str).map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
    let timestamp_str: String = row.try_get("timestamp").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
    let timestamp = parse_datetime(&timestamp_str).map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

    Ok(TraceEvent {
        id: row.try_get("id").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?,
        trace_id: parse_uuid(&row.try_get::<String, _>("trace_id").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?)
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?,
        task_id: parse_uuid(&row.try_get::<String, _>("task_id").map_err(|e| EventStoreError::DatabaseError(e.to_string()))?)
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?,
        task_type,
        timestamp,
        payload,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(
        &self,
        trace_id: Uuid,
        task_id: Uuid,
        task_type: TaskType,
        payload: crate::domain::models::EventPayload,
    ) -> Result<TraceEvent, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM trace_events WHERE trace_id = ?")
            .bind(trace_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let next_id: i64 = row.try_get::<i64, _>("max_id")? + 1;

        let event = TraceEvent {
            id: next_id,
            trace_id,
            task_id,
            task_type,
            timestamp: chrono::Utc::now(),
            payload,
        };
        let payload_blob = serde_json::to_string(&event.payload)
            .map_err(|e| EventStoreError::AppendError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO trace_events (id, trace_id, task_id, task_type, event_name, payload, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id)
        .bind(event.trace_id.to_string())
        .bind(event.task_id.to_string())
        .bind(event.task_type.as_str())
        .bind(event.payload.name())
        .bind(payload_blob)
        .bind(event.timestamp.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<TraceEvent>, EventStoreError> {
        let rows = sqlx::query(
            "SELECT id, trace_id, task_id, task_type, payload, timestamp FROM trace_events
             WHERE trace_id = ? AND id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(query.trace_id.to_string())
        .bind(query.after_id)
        .bind(query.max_count as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }

    async fn latest_id(&self, trace_id: Uuid) -> Result<Option<i64>, EventStoreError> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM trace_events WHERE trace_id = ?")
            .bind(trace_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("max_id")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::EventPayload;

    async fn store() -> SqliteEventStore {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        SqliteEventStore::new(pool)
    }

    #[tokio::test]
    async fn append_assigns_monotonic_per_trace_ids() {
        let store = store().await;
        let trace_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let first = store
            .append(trace_id, task_id, TaskType::RestartPedestal, EventPayload::TaskStarted)
            .await
            .unwrap();
        let second = store
            .append(
                trace_id,
                task_id,
                TaskType::RestartPedestal,
                EventPayload::RestartPedestalStarted { namespace: "ts0".into() },
            )
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn query_resumes_strictly_after_last_id() {
        let store = store().await;
        let trace_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        for _ in 0..5 {
            store
                .append(trace_id, task_id, TaskType::RestartPedestal, EventPayload::TaskStarted)
                .await
                .unwrap();
        }

        let page = store.query(EventQuery::new(trace_id).after_id(2)).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page.iter().all(|e| e.id > 2));
    }

    #[tokio::test]
    async fn distinct_traces_have_independent_sequences() {
        let store = store().await;
        let trace_a = Uuid::new_v4();
        let trace_b = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        store
            .append(trace_a, task_id, TaskType::RestartPedestal, EventPayload::TaskStarted)
            .await
            .unwrap();
        let b_first = store
            .append(trace_b, task_id, TaskType::RestartPedestal, EventPayload::TaskStarted)
            .await
            .unwrap();

        assert_eq!(b_first.id, 1);
    }

    #[tokio::test]
    async fn latest_id_is_none_for_an_unseen_trace() {
        let store = store().await;
        assert_eq!(store.latest_id(Uuid::new_v4()).await.unwrap(), None);
    }
}

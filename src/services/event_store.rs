//! EventStore trait for per-trace event persistence (C8).
//!
//! Defines the interface for appending to and querying a trace's
//! append-only event log.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::TraceEvent;

/// Error type for EventStore operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Failed to append event: {0}")]
    AppendError(String),

    #[error("Failed to query events: {0}")]
    QueryError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for EventStoreError {
    fn from(err: sqlx::Error) -> Self {
        EventStoreError::DatabaseError(err.to_string())
    }
}

/// Query parameters for `ReadTrace(traceId, lastId, maxCount, ...)`.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub trace_id: Uuid,
    /// Return only entries with `id > after_id`.
    pub after_id: i64,
    pub max_count: u32,
}

impl EventQuery {
    pub fn new(trace_id: Uuid) -> Self {
        Self {
            trace_id,
            after_id: 0,
            max_count: 100,
        }
    }

    pub fn after_id(mut self, id: i64) -> Self {
        self.after_id = id;
        self
    }

    pub fn max_count(mut self, max: u32) -> Self {
        self.max_count = max;
        self
    }
}

/// Trait for per-trace event log persistence implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to its trace's log, assigning it the next
    /// monotonic per-trace sequence id. Returns the assigned event.
    async fn append(
        &self,
        trace_id: Uuid,
        task_id: Uuid,
        task_type: crate::domain::models::TaskType,
        payload: crate::domain::models::EventPayload,
    ) -> Result<TraceEvent, EventStoreError>;

    /// Query a trace's log (§4.8 `ReadTrace`).
    async fn query(&self, query: EventQuery) -> Result<Vec<TraceEvent>, EventStoreError>;

    /// Highest event id seen so far for a trace, if any.
    async fn latest_id(&self, trace_id: Uuid) -> Result<Option<i64>, EventStoreError>;
}

/// In-memory event store, used by tests and by `InMemoryEventStore::new()`
/// fixtures that don't need a real SQLite pool.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: tokio::sync::RwLock<Vec<TraceEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        trace_id: Uuid,
        task_id: Uuid,
        task_type: crate::domain::models::TaskType,
        payload: crate::domain::models::EventPayload,
    ) -> Result<TraceEvent, EventStoreError> {
        let mut events = self.events.write().await;
        let next_id = events
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .map(|e| e.id)
            .max()
            .unwrap_or(0)
            + 1;
        let event = TraceEvent {
            id: next_id,
            trace_id,
            task_id,
            task_type,
            timestamp: chrono::Utc::now(),
            payload,
        };
        events.push(event.clone());
        Ok(event)
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<TraceEvent>, EventStoreError> {
        let events = self.events.read().await;
        let mut result: Vec<_> = events
            .iter()
            .filter(|e| e.trace_id == query.trace_id && e.id > query.after_id)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.id);
        result.truncate(query.max_count as usize);
        Ok(result)
    }

    async fn latest_id(&self, trace_id: Uuid) -> Result<Option<i64>, EventStoreError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .map(|e| e.id)
            .max())
    }
}

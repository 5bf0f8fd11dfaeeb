//! Namespace monitor port (C4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::NamespaceReservation;

#[async_trait]
pub trait NamespaceRepository: Send + Sync {
    /// Return a namespace from `prefix`'s pool (indices `0..count`) that has
    /// no reservation overlapping `[now, hold_until]`, reserving it for
    /// `trace_id` in the same atomic step. If `trace_id` already holds a
    /// namespace in this prefix whose interval contains `now`, that same
    /// namespace is returned (idempotent restart) rather than a new one
    /// being picked.
    async fn get_namespace_to_restart(
        &self,
        prefix: &str,
        count: u32,
        trace_id: Uuid,
        now: DateTime<Utc>,
        hold_until: DateTime<Utc>,
    ) -> DomainResult<Option<String>>;

    /// Clear the reservation held by `trace_id` on `namespace`, if any.
    async fn release_lock(&self, namespace: &str, trace_id: Uuid) -> DomainResult<bool>;

    /// Full reservation map, for debugging.
    async fn inspect_lock(&self) -> DomainResult<Vec<NamespaceReservation>>;
}

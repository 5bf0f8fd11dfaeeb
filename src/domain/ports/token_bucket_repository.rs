//! Token bucket limiter port (C3).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait TokenBucketRepository: Send + Sync {
    /// If `|members(bucket)| < capacity`, add `holder` (refreshing its
    /// acquired-at timestamp for TTL purposes) and return `true`; otherwise
    /// return `false` without mutating state. Stale members (older than
    /// `ttl`) are reaped as part of the same atomic operation so a crashed
    /// holder's slot becomes available without a separate sweep.
    async fn acquire(
        &self,
        bucket: &str,
        holder: Uuid,
        capacity: u32,
        ttl: std::time::Duration,
    ) -> DomainResult<bool>;

    /// Remove `holder` from `bucket`. Returns whether a member was removed.
    async fn release(&self, bucket: &str, holder: Uuid) -> DomainResult<bool>;

    /// Current membership count for a bucket (after reaping stale members).
    async fn member_count(&self, bucket: &str, ttl: std::time::Duration) -> DomainResult<u32>;

    /// Full membership map, for debugging / `InspectLock`-style introspection.
    async fn inspect(&self) -> DomainResult<Vec<(String, Uuid)>>;
}

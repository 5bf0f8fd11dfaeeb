//! Token bucket rate limiter (C3).
//!
//! Named buckets (`restart_pedestal`, `build_container`, `run_algorithm`, …)
//! with configurable capacity; acquire/release is an atomic operation against
//! the `TokenBucketRepository` port, holders identified by task id so leaked
//! slots from crashed holders are eventually reaped by TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::TokenBucketRepository;

/// Default time-to-live for a held token before it is considered stale and
/// reaped on the next `acquire`/`member_count` call (10 minutes, matching
/// the interval a crashed holder's restart window needs to bridge).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub ttl: Duration,
    pub poll_interval: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TOKEN_TTL,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Service wrapping a `TokenBucketRepository` with the wait-with-timeout
/// behaviour handlers use when a bucket is momentarily full.
pub struct TokenBucketService {
    repository: Arc<dyn TokenBucketRepository>,
    config: TokenBucketConfig,
}

impl TokenBucketService {
    pub fn new(repository: Arc<dyn TokenBucketRepository>, config: TokenBucketConfig) -> Self {
        Self { repository, config }
    }

    pub fn with_defaults(repository: Arc<dyn TokenBucketRepository>) -> Self {
        Self::new(repository, TokenBucketConfig::default())
    }

    /// Attempt a single acquire against `bucket`'s configured `capacity`.
    #[instrument(skip(self))]
    pub async fn acquire(&self, bucket: &str, holder: Uuid, capacity: u32) -> DomainResult<bool> {
        self.repository
            .acquire(bucket, holder, capacity, self.config.ttl)
            .await
    }

    /// Release a previously acquired token. Safe to call even if the holder
    /// was already reaped by TTL; returns whether a member was removed.
    #[instrument(skip(self))]
    pub async fn release(&self, bucket: &str, holder: Uuid) -> DomainResult<bool> {
        self.repository.release(bucket, holder).await
    }

    /// Loop attempting `acquire` on each tick of `poll_interval` until either
    /// a token is acquired or `timeout` elapses. Callers that time out are
    /// expected to reschedule the task with back-off rather than block a
    /// worker indefinitely.
    #[instrument(skip(self))]
    pub async fn wait_for_token(
        &self,
        bucket: &str,
        holder: Uuid,
        capacity: u32,
        timeout: Duration,
    ) -> DomainResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.acquire(bucket, holder, capacity).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub async fn member_count(&self, bucket: &str) -> DomainResult<u32> {
        self.repository.member_count(bucket, self.config.ttl).await
    }

    pub async fn inspect(&self) -> DomainResult<Vec<(String, Uuid)>> {
        self.repository.inspect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult as Result_;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTokenBucketRepository {
        members: Mutex<HashMap<String, Vec<Uuid>>>,
    }

    #[async_trait]
    impl TokenBucketRepository for FakeTokenBucketRepository {
        async fn acquire(
            &self,
            bucket: &str,
            holder: Uuid,
            capacity: u32,
            _ttl: Duration,
        ) -> Result_<bool> {
            let mut members = self.members.lock().unwrap();
            let entry = members.entry(bucket.to_string()).or_default();
            if entry.len() as u32 >= capacity {
                return Ok(false);
            }
            if !entry.contains(&holder) {
                entry.push(holder);
            }
            Ok(true)
        }

        async fn release(&self, bucket: &str, holder: Uuid) -> Result_<bool> {
            let mut members = self.members.lock().unwrap();
            if let Some(entry) = members.get_mut(bucket) {
                let before = entry.len();
                entry.retain(|h| *h != holder);
                return Ok(entry.len() != before);
            }
            Ok(false)
        }

        async fn member_count(&self, bucket: &str, _ttl: Duration) -> Result_<u32> {
            let members = self.members.lock().unwrap();
            Ok(members.get(bucket).map(Vec::len).unwrap_or(0) as u32)
        }

        async fn inspect(&self) -> Result_<Vec<(String, Uuid)>> {
            let members = self.members.lock().unwrap();
            Ok(members
                .iter()
                .flat_map(|(bucket, holders)| holders.iter().map(|h| (bucket.clone(), *h)))
                .collect())
        }
    }

    #[tokio::test]
    async fn acquire_respects_capacity() {
        let service = TokenBucketService::with_defaults(Arc::new(FakeTokenBucketRepository::default()));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert!(service.acquire("run_algorithm", a, 2).await.unwrap());
        assert!(service.acquire("run_algorithm", b, 2).await.unwrap());
        assert!(!service.acquire("run_algorithm", c, 2).await.unwrap());
    }

    #[tokio::test]
    async fn release_frees_a_slot_for_the_next_acquirer() {
        let service = TokenBucketService::with_defaults(Arc::new(FakeTokenBucketRepository::default()));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(service.acquire("build_container", a, 1).await.unwrap());
        assert!(!service.acquire("build_container", b, 1).await.unwrap());
        assert!(service.release("build_container", a).await.unwrap());
        assert!(service.acquire("build_container", b, 1).await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_token_times_out_when_bucket_stays_full() {
        let mut config = TokenBucketConfig::default();
        config.poll_interval = Duration::from_millis(10);
        let service = TokenBucketService::new(Arc::new(FakeTokenBucketRepository::default()), config);
        let holder = Uuid::new_v4();
        let blocker = Uuid::new_v4();

        assert!(service.acquire("restart_pedestal", blocker, 1).await.unwrap());
        let acquired = service
            .wait_for_token("restart_pedestal", holder, 1, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!acquired);
    }

    #[tokio::test]
    async fn zero_capacity_never_acquires() {
        let service = TokenBucketService::with_defaults(Arc::new(FakeTokenBucketRepository::default()));
        let holder = Uuid::new_v4();
        assert!(!service.acquire("build_container", holder, 0).await.unwrap());
    }
}

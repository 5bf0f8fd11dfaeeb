//! Namespace reservation monitor (C4).
//!
//! Reserves one namespace from a prefix-indexed pool for a future wall-clock
//! window and enforces mutual exclusion over that interval. Acquisition is
//! serialised per namespace by the `NamespaceRepository` implementation (an
//! in-process keyed mutex for the in-memory adapter, a transaction for the
//! SQLite one); this service only adds the poll-with-timeout convenience
//! handlers need when a pool is momentarily exhausted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::NamespaceReservation;
use crate::domain::ports::NamespaceRepository;

#[derive(Debug, Clone, Copy)]
pub struct NamespaceMonitorConfig {
    pub poll_interval: Duration,
}

impl Default for NamespaceMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct NamespaceMonitor {
    repository: Arc<dyn NamespaceRepository>,
    config: NamespaceMonitorConfig,
}

impl NamespaceMonitor {
    pub fn new(repository: Arc<dyn NamespaceRepository>, config: NamespaceMonitorConfig) -> Self {
        Self { repository, config }
    }

    pub fn with_defaults(repository: Arc<dyn NamespaceRepository>) -> Self {
        Self::new(repository, NamespaceMonitorConfig::default())
    }

    /// Single attempt: return a free namespace from `prefix`'s pool (or the
    /// one `trace_id` already holds, for idempotent restarts), reserving it
    /// through `hold_until`.
    #[instrument(skip(self))]
    pub async fn get_namespace_to_restart(
        &self,
        prefix: &str,
        count: u32,
        trace_id: Uuid,
        hold_until: DateTime<Utc>,
    ) -> DomainResult<Option<String>> {
        self.repository
            .get_namespace_to_restart(prefix, count, trace_id, Utc::now(), hold_until)
            .await
    }

    /// Poll `get_namespace_to_restart` until a namespace is free or `timeout`
    /// elapses. Callers should reschedule with back-off on timeout rather
    /// than block a worker.
    #[instrument(skip(self))]
    pub async fn wait_for_namespace(
        &self,
        prefix: &str,
        count: u32,
        trace_id: Uuid,
        hold_until: DateTime<Utc>,
        timeout: Duration,
    ) -> DomainResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(ns) = self
                .get_namespace_to_restart(prefix, count, trace_id, hold_until)
                .await?
            {
                return Ok(Some(ns));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub async fn release_lock(&self, namespace: &str, trace_id: Uuid) -> DomainResult<bool> {
        self.repository.release_lock(namespace, trace_id).await
    }

    pub async fn inspect_lock(&self) -> DomainResult<Vec<NamespaceReservation>> {
        self.repository.inspect_lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult as Result_;
    use crate::domain::models::namespace_name;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeNamespaceRepository {
        reservations: Mutex<Vec<NamespaceReservation>>,
    }

    #[async_trait]
    impl NamespaceRepository for FakeNamespaceRepository {
        async fn get_namespace_to_restart(
            &self,
            prefix: &str,
            count: u32,
            trace_id: Uuid,
            now: DateTime<Utc>,
            hold_until: DateTime<Utc>,
        ) -> Result_<Option<String>> {
            let mut reservations = self.reservations.lock().unwrap();

            for existing in reservations.iter() {
                if existing.trace_id == trace_id && existing.is_held_by(trace_id, now) {
                    return Ok(Some(existing.namespace.clone()));
                }
            }

            for idx in 0..count {
                let ns = namespace_name(prefix, idx);
                let conflict = reservations
                    .iter()
                    .any(|r| r.namespace == ns && r.overlaps(now, hold_until));
                if !conflict {
                    reservations.push(NamespaceReservation::with_start(ns.clone(), trace_id, now, hold_until));
                    return Ok(Some(ns));
                }
            }
            Ok(None)
        }

        async fn release_lock(&self, namespace: &str, trace_id: Uuid) -> Result_<bool> {
            let mut reservations = self.reservations.lock().unwrap();
            let before = reservations.len();
            reservations.retain(|r| !(r.namespace == namespace && r.trace_id == trace_id));
            Ok(reservations.len() != before)
        }

        async fn inspect_lock(&self) -> Result_<Vec<NamespaceReservation>> {
            Ok(self.reservations.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn second_reservation_for_same_namespace_is_rejected() {
        let monitor = NamespaceMonitor::with_defaults(Arc::new(FakeNamespaceRepository::default()));
        let trace_a = Uuid::new_v4();
        let trace_b = Uuid::new_v4();
        let hold_until = Utc::now() + chrono::Duration::seconds(10);

        let first = monitor
            .get_namespace_to_restart("ts", 1, trace_a, hold_until)
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("ts0"));

        let second = monitor
            .get_namespace_to_restart("ts", 1, trace_b, hold_until)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn releasing_frees_the_namespace_for_another_trace() {
        let monitor = NamespaceMonitor::with_defaults(Arc::new(FakeNamespaceRepository::default()));
        let trace_a = Uuid::new_v4();
        let trace_b = Uuid::new_v4();
        let hold_until = Utc::now() + chrono::Duration::seconds(10);

        monitor
            .get_namespace_to_restart("ts", 1, trace_a, hold_until)
            .await
            .unwrap();
        monitor.release_lock("ts0", trace_a).await.unwrap();

        let second = monitor
            .get_namespace_to_restart("ts", 1, trace_b, hold_until)
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("ts0"));
    }

    #[tokio::test]
    async fn same_trace_reacquiring_is_idempotent() {
        let monitor = NamespaceMonitor::with_defaults(Arc::new(FakeNamespaceRepository::default()));
        let trace = Uuid::new_v4();
        let hold_until = Utc::now() + chrono::Duration::seconds(10);

        let first = monitor
            .get_namespace_to_restart("ts", 2, trace, hold_until)
            .await
            .unwrap();
        let second = monitor
            .get_namespace_to_restart("ts", 2, trace, hold_until)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}

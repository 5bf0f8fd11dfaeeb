//! Token bucket domain model (C3).
//!
//! A named bucket with a configured `capacity`; membership is keyed by
//! `task_id` (the holder) rather than an anonymous counter, so a crashed
//! holder's slot can be reclaimed once its entry ages past the TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default safety TTL: long enough to bridge a normal restart, short enough
/// that an orphaned holder eventually frees its slot.
pub const DEFAULT_HOLDER_TTL_SECS: i64 = 600;

/// One outstanding slot in a named bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketMember {
    pub bucket: String,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl BucketMember {
    pub fn new(bucket: impl Into<String>, holder: Uuid) -> Self {
        Self {
            bucket: bucket.into(),
            holder,
            acquired_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        now.signed_duration_since(self.acquired_at) >= chrono::Duration::seconds(ttl_secs)
    }
}

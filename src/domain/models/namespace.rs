//! Namespace reservation domain model (C4).
//!
//! A namespace is identified by `<prefix><index>`. Exactly one reservation
//! may hold a given namespace for any overlapping wall-clock interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded exclusive lease on one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceReservation {
    pub namespace: String,
    pub trace_id: Uuid,
    pub start: DateTime<Utc>,
    pub hold_until: DateTime<Utc>,
}

impl NamespaceReservation {
    pub fn new(namespace: impl Into<String>, trace_id: Uuid, hold_until: DateTime<Utc>) -> Self {
        Self::with_start(namespace, trace_id, Utc::now(), hold_until)
    }

    /// Like `new`, but with an explicit `start` rather than `Utc::now()` —
    /// for callers (and tests) that already have `now` in hand.
    pub fn with_start(namespace: impl Into<String>, trace_id: Uuid, start: DateTime<Utc>, hold_until: DateTime<Utc>) -> Self {
        Self {
            namespace: namespace.into(),
            trace_id,
            start,
            hold_until,
        }
    }

    /// Whether `[self.start, self.hold_until]` overlaps `[other_start, other_hold_until]`.
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_hold_until: DateTime<Utc>) -> bool {
        self.start < other_hold_until && other_start < self.hold_until
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.hold_until <= now
    }

    pub fn is_held_by(&self, trace_id: Uuid, now: DateTime<Utc>) -> bool {
        self.trace_id == trace_id && self.start <= now && now < self.hold_until
    }
}

/// Formats a namespace name from a configured prefix and pool index.
pub fn namespace_name(prefix: &str, index: u32) -> String {
    format!("{prefix}{index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn overlapping_intervals_are_detected() {
        let now = Utc::now();
        let r = NamespaceReservation::new("ts0", Uuid::new_v4(), now + Duration::seconds(10));
        assert!(r.overlaps(now + Duration::seconds(5), now + Duration::seconds(15)));
        assert!(!r.overlaps(now + Duration::seconds(10), now + Duration::seconds(20)));
    }

    #[test]
    fn expiry_is_based_on_hold_until() {
        let now = Utc::now();
        let r = NamespaceReservation::new("ts0", Uuid::new_v4(), now - Duration::seconds(1));
        assert!(r.is_expired(now));
    }

    #[test]
    fn idempotent_restart_recognised_as_held_by_same_trace() {
        let trace_id = Uuid::new_v4();
        let now = Utc::now();
        let r = NamespaceReservation::new("ts0", trace_id, now + Duration::seconds(10));
        assert!(r.is_held_by(trace_id, now));
        assert!(!r.is_held_by(Uuid::new_v4(), now));
    }

    #[test]
    fn namespace_name_formats_prefix_and_index() {
        assert_eq!(namespace_name("ts", 0), "ts0");
        assert_eq!(namespace_name("bench-", 12), "bench-12");
    }
}

//! Trace event domain model.
//!
//! Events form a closed, per-trace, append-only log. The payload is a
//! closed enum rather than a reflectively-dispatched bag of fields, so an
//! unrecognised event name is a compile error, not a silent no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskType;

/// Closed set of event payloads. Tagged so the wire/at-rest representation
/// carries both the event name and its typed data in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EventPayload {
    TaskStarted,
    TaskStateUpdate {
        state: String,
        message: Option<String>,
    },
    RestartPedestalStarted {
        namespace: String,
    },
    RestartPedestalCompleted {
        namespace: String,
    },
    RestartPedestalFailed {
        namespace: String,
        error: String,
    },
    NoNamespaceAvailable {
        prefix: String,
    },
    FaultInjectionStarted,
    FaultInjectionCompleted {
        injection_end: DateTime<Utc>,
    },
    FaultInjectionFailed {
        error: String,
    },
    DatapackBuildStarted,
    DatapackBuildSucceed {
        datapack_id: Uuid,
    },
    DatapackBuildFailed {
        error: String,
    },
    DatapackNoDetectorData,
    DatapackResultCollection {
        anomaly: bool,
        result_ref: String,
    },
    DatapackNoAnomaly,
    AlgoRunStarted {
        job_name: String,
    },
    AlgoRunSucceed {
        job_name: String,
    },
    AlgoRunFailed {
        job_name: String,
        error: String,
    },
    NoTokenAvailable {
        bucket: String,
    },
    JobSucceed {
        job_name: String,
        logs_ref: Option<String>,
    },
    JobFailed {
        job_name: String,
        error: String,
        logs_ref: Option<String>,
    },
}

impl EventPayload {
    /// Event name as it appears in the closed taxonomy of section 3.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskStarted => "TaskStarted",
            Self::TaskStateUpdate { .. } => "TaskStateUpdate",
            Self::RestartPedestalStarted { .. } => "RestartPedestalStarted",
            Self::RestartPedestalCompleted { .. } => "RestartPedestalCompleted",
            Self::RestartPedestalFailed { .. } => "RestartPedestalFailed",
            Self::NoNamespaceAvailable { .. } => "NoNamespaceAvailable",
            Self::FaultInjectionStarted => "FaultInjectionStarted",
            Self::FaultInjectionCompleted { .. } => "FaultInjectionCompleted",
            Self::FaultInjectionFailed { .. } => "FaultInjectionFailed",
            Self::DatapackBuildStarted => "DatapackBuildStarted",
            Self::DatapackBuildSucceed { .. } => "DatapackBuildSucceed",
            Self::DatapackBuildFailed { .. } => "DatapackBuildFailed",
            Self::DatapackNoDetectorData => "DatapackNoDetectorData",
            Self::DatapackResultCollection { .. } => "DatapackResultCollection",
            Self::DatapackNoAnomaly => "DatapackNoAnomaly",
            Self::AlgoRunStarted { .. } => "AlgoRunStarted",
            Self::AlgoRunSucceed { .. } => "AlgoRunSucceed",
            Self::AlgoRunFailed { .. } => "AlgoRunFailed",
            Self::NoTokenAvailable { .. } => "NoTokenAvailable",
            Self::JobSucceed { .. } => "JobSucceed",
            Self::JobFailed { .. } => "JobFailed",
        }
    }

    /// Whether seeing this event means a trace's stream is done (§4.8).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FaultInjectionCompleted { .. }
                | Self::FaultInjectionFailed { .. }
                | Self::DatapackResultCollection { .. }
                | Self::DatapackNoAnomaly
                | Self::DatapackNoDetectorData
        )
    }
}

/// One entry in a trace's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Monotonic, per-trace sequence id. Clients resume by passing the last
    /// one they observed.
    pub id: i64,
    pub trace_id: Uuid,
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_match_section_four_eight() {
        assert!(EventPayload::FaultInjectionCompleted {
            injection_end: Utc::now()
        }
        .is_terminal());
        assert!(EventPayload::DatapackNoAnomaly.is_terminal());
        assert!(!EventPayload::TaskStarted.is_terminal());
        assert!(!EventPayload::AlgoRunStarted {
            job_name: "job".into()
        }
        .is_terminal());
    }

    #[test]
    fn event_name_matches_closed_taxonomy() {
        assert_eq!(EventPayload::TaskStarted.name(), "TaskStarted");
        assert_eq!(
            EventPayload::NoTokenAvailable {
                bucket: "run_algorithm".into()
            }
            .name(),
            "NoTokenAvailable"
        );
    }
}

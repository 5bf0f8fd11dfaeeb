//! Domain models
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod event;
pub mod namespace;
pub mod task;
pub mod token_bucket;

pub use event::{EventPayload, TraceEvent};
pub use namespace::{namespace_name, NamespaceReservation};
pub use task::{RetryPolicy, Task, TaskState, TaskType};
pub use token_bucket::{BucketMember, DEFAULT_HOLDER_TTL_SECS};

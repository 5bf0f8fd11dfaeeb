//! Domain layer: task/queue/namespace/event models and the ports services
//! depend on. Framework-agnostic; no `sqlx`, `axum`, or `tokio` I/O here
//! beyond the trait signatures themselves.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

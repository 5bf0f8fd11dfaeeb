//! Task orchestration core: submits, schedules, and dispatches chaos-
//! engineering experiment tasks over a Kubernetes cluster, exposing a
//! minimal HTTP surface and a per-trace event stream.

pub mod adapters;
pub mod domain;
pub mod http;
pub mod infrastructure;
pub mod services;

//! Infrastructure layer
//!
//! Ambient engineering concerns that cut across all components: structured
//! logging here, SQLite persistence under `crate::adapters::sqlite`.

pub mod logging;

//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting
//! - Optional rotated file output
//! - Secret scrubbing

pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use config::LogConfig;
pub use logger::LoggerImpl;

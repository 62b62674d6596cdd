//! Monitoring Module
//!
//! Provides observability for Graft:
//! - Structured logging via `tracing`

pub mod logging;

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};

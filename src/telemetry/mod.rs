//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Decision counters, global and per switch

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{Counter, MetricsRegistry, SwitchStats};

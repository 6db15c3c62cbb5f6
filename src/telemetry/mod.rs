//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Metrics collection for forwarding statistics

mod logging;
mod metrics;

pub(crate) use logging::is_known_level;
pub use logging::{LogConfig, init_logging};
pub use metrics::{Counter, DirectionStats, MetricsRegistry};

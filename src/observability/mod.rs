//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout; JSON in production)
//!     → Metrics endpoint (Prometheus scrape, separate listener)
//! ```
//!
//! # Design Decisions
//! - Request IDs are attached by middleware and flow through logs
//! - Metrics are cheap (atomic increments)
//! - Both are configured from the `observability` config section

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;

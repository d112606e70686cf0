//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, target `stream_proxy`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the request-id layer into every forwarder log
//! - Benign upstream errors (resets, GOAWAY, client aborts) log at debug
//! - Metrics are cheap and silently dropped when no exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;

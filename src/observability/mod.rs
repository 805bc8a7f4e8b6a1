//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net, adapters, middleware, lifecycle produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs via the request_id middleware
//! - Metrics are cheap (atomic increments) and off unless enabled

pub mod logging;
pub mod metrics;

//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt subscriber, full or compact)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`connection`, `domain`, `service`) on every event
//! - `RUST_LOG` overrides the configured level
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;

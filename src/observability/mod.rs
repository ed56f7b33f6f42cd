//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarder / Receiver produce:
//!     → logging.rs (structured log events, one span per exchange)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Exchange IDs are span fields, so every event of one request correlates
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

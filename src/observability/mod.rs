//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Log events carry client, server, in_port and dpid as fields
//! - Metrics are cheap (atomic increments)
//! - The metrics endpoint is optional and off by default

pub mod logging;
pub mod metrics;

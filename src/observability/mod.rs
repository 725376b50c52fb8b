//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! executor callbacks (fetch_latency, fetch_logger)
//!     → metrics.rs (counters, histograms → Prometheus scrape)
//!     → tracing (structured log lines)
//! ```
//!
//! # Design Decisions
//! - The aggregation core only sees injected callbacks; the wiring to the
//!   global recorder happens in the binary
//! - The request ID flows from the inbound call into every fetch log line

pub mod logging;
pub mod metrics;

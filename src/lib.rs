//! Aggregator gateway library.
//!
//! One inbound POST carries an envelope of named sub-requests; the gateway
//! dispatches them concurrently against a single upstream backend and
//! answers with one merged JSON document keyed by the caller-chosen names.
//! Browser and mobile clients replace N round-trips with one while the
//! upstream API surface stays unchanged.

pub mod aggregate;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use aggregate::{Aggregator, DefaultExecutor, Executor, ExecutorOptions};
pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

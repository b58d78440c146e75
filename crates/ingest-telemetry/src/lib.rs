//! Metrics and health endpoints for the email ingestion subsystem.

pub mod metrics;
pub mod server;

pub use metrics::MetricsRegistry;
pub use server::{HealthCheckFn, TelemetryServer};

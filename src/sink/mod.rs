//! The StatsD side of the plugin.
//!
//! The instrumentation code only ever talks to a [`MetricSink`]. The crate
//! ships a cadence backed [`StatsdClient`], a no-op client used when no host
//! is configured, a callback based [`CustomClient`] and an in-memory
//! transport for tests.

mod client;
mod custom;
mod memory;
mod tcp;

pub use client::{ErrorHandler, StatsdClient};
pub use custom::{CustomClient, CustomSink};
pub use memory::MemorySink;
pub use tcp::TcpMetricSink;

use crate::error::MetricsError;

/// Names of the functions a custom client has to provide, in probing order.
pub const STATSD_METHODS: [&str; 6] = ["counter", "timing", "gauge", "set", "close", "connect"];

/// Capability required from a metrics client.
///
/// Send functions are fire-and-forget: transport failures are the sink's own
/// business and must not reach the caller.
pub trait MetricSink: Send + Sync {
    fn counter(&self, name: &str, value: i64, sampling: Option<f64>);

    /// `value` is in milliseconds.
    fn timing(&self, name: &str, value: f64, sampling: Option<f64>);

    fn gauge(&self, name: &str, value: f64);

    fn set(&self, name: &str, value: &str);

    fn connect(&self) -> Result<(), MetricsError>;

    fn close(&self) -> Result<(), MetricsError>;

    /// Namespace prepended to every metric by this sink, if any.
    fn namespace(&self) -> &str {
        ""
    }
}

/// Sink used when the connection parameters carry no host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClient;

impl MetricSink for NoopClient {
    fn counter(&self, _name: &str, _value: i64, _sampling: Option<f64>) {}

    fn timing(&self, _name: &str, _value: f64, _sampling: Option<f64>) {}

    fn gauge(&self, _name: &str, _value: f64) {}

    fn set(&self, _name: &str, _value: &str) {}

    fn connect(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn close(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}

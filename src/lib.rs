//! Per-route StatsD metrics for axum.
//!
//! Register a plugin instance with [`Metrics::register`], build routes
//! through its [`MetricsRouter`] and every request gets a `requests`
//! counter, an `errors.<status>` counter and a `response_time` timing,
//! prefixed by a label derived from the route's scope, the configured
//! routes prefix and its route id. Handlers reach the same label through
//! the [`MetricContext`] extractor.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod hrtime;
pub mod label;
mod middleware;
pub mod plugin;
pub mod router;
pub mod sink;
pub mod timerify;

pub use config::{
    ClientConfig, ClientOptions, HealthOptions, HookFlags, PluginOptions, RoutesOptions,
    DEFAULT_SAMPLE_INTERVAL,
};
pub use dispatch::{Dispatcher, MetricContext};
pub use error::{HandlerError, MetricsError, RouteError};
pub use health::{HealthSample, HealthSampler};
pub use label::{GetLabel, LabelMode, LabelRequest, RouteConfig, RouteRegistration, UNTRACKED_ROUTE_ID};
pub use plugin::Metrics;
pub use router::MetricsRouter;
pub use sink::{CustomClient, MemorySink, MetricSink, NoopClient, StatsdClient};
pub use timerify::{TimerRegistry, TimerifyOptions};

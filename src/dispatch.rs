//! Per-request metric senders.
//!
//! Every instrumented request gets a [`MetricContext`] holding the label
//! resolved for it. The same context is stored on the request (for the
//! handler) and on the response, so both sides always agree on the label.

use std::fmt;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::label::RouteMetadata;
use crate::sink::MetricSink;

/// Forwards prefixed metrics to the sink. One per plugin instance, shared by
/// all of its routes, so the untracked check happens on every call.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn MetricSink>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn MetricSink>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn MetricSink> {
        &self.client
    }

    fn timing(&self, route: &RouteMetadata, label: &str, name: &str, value: f64, sampling: Option<f64>) {
        if route.is_tracked() {
            self.client.timing(&join(label, name), value, sampling);
        }
    }

    fn counter(&self, route: &RouteMetadata, label: &str, name: &str, value: Option<i64>, sampling: Option<f64>) {
        if route.is_tracked() {
            self.client.counter(&join(label, name), value.unwrap_or(1), sampling);
        }
    }

    fn gauge(&self, route: &RouteMetadata, label: &str, name: &str, value: f64) {
        if route.is_tracked() {
            self.client.gauge(&join(label, name), value);
        }
    }

    fn set(&self, route: &RouteMetadata, label: &str, name: &str, value: &str) {
        if route.is_tracked() {
            self.client.set(&join(label, name), value);
        }
    }
}

fn join(label: &str, name: &str) -> String {
    let mut metric = String::with_capacity(label.len() + name.len() + 1);
    metric.push_str(label);
    metric.push('.');
    metric.push_str(name);
    metric
}

/// Label binding of one request/response exchange, plus the senders that
/// use it.
///
/// Extract it in a handler to send custom metrics:
///
/// ```ignore
/// async fn handler(metrics: MetricContext) -> &'static str {
///     metrics.send_counter_metric("cache_miss", None, None);
///     "ok"
/// }
/// ```
#[derive(Clone)]
pub struct MetricContext {
    label: Arc<str>,
    route: Arc<RouteMetadata>,
    dispatcher: Dispatcher,
}

impl MetricContext {
    pub(crate) fn bind(label: Arc<str>, route: Arc<RouteMetadata>, dispatcher: Dispatcher) -> Self {
        Self {
            label,
            route,
            dispatcher,
        }
    }

    /// The label resolved for this exchange. Never recomputed.
    pub fn get_metric_label(&self) -> &str {
        &self.label
    }

    pub fn route(&self) -> &RouteMetadata {
        &self.route
    }

    /// `value` in milliseconds.
    pub fn send_timing_metric(&self, name: &str, value: f64, sampling: Option<f64>) {
        self.dispatcher
            .timing(&self.route, &self.label, name, value, sampling);
    }

    /// `value` defaults to 1.
    pub fn send_counter_metric(&self, name: &str, value: Option<i64>, sampling: Option<f64>) {
        self.dispatcher
            .counter(&self.route, &self.label, name, value, sampling);
    }

    pub fn send_gauge_metric(&self, name: &str, value: f64) {
        self.dispatcher.gauge(&self.route, &self.label, name, value);
    }

    pub fn send_set_metric(&self, name: &str, value: impl fmt::Display) {
        self.dispatcher
            .set(&self.route, &self.label, name, &value.to_string());
    }
}

impl fmt::Debug for MetricContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricContext")
            .field("label", &self.label)
            .field("route_id", &self.route.route_id())
            .finish()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MetricContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<MetricContext>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "route is not instrumented by the metrics router",
        ))
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use axum_statsd_metrics::{
    ClientOptions, HealthOptions, MemorySink, MetricContext, MetricSink, Metrics, PluginOptions,
    RoutesOptions, StatsdClient,
};
use tower::ServiceExt;

/// Options writing into `sink` without a namespace and without health
/// sampling.
pub fn options(sink: &MemorySink, routes: RoutesOptions) -> PluginOptions {
    let client: Arc<dyn MetricSink> = Arc::new(StatsdClient::from_sink("", sink.clone()));
    PluginOptions::default()
        .with_client(ClientOptions::Sink(client))
        .with_routes(routes)
        .with_health(HealthOptions::Disabled)
}

pub async fn register(sink: &MemorySink, routes: RoutesOptions) -> Metrics {
    Metrics::register(options(sink, routes)).await.unwrap()
}

pub async fn register_at(prefix: &str, sink: &MemorySink, routes: RoutesOptions) -> Metrics {
    Metrics::register_at(prefix, options(sink, routes)).await.unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn call(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Handler answering with the label bound to the request.
pub async fn echo_label(metrics: MetricContext) -> String {
    metrics.get_metric_label().to_owned()
}

/// Lines sent with the given metric name, e.g. `123.requests`.
pub fn lines_for(sink: &MemorySink, metric: &str) -> Vec<String> {
    let prefix = format!("{metric}:");
    sink.lines()
        .into_iter()
        .filter(|line| line.starts_with(&prefix))
        .collect()
}

/// Value of a timing line such as `a.response_time:1.25|ms`.
pub fn timing_value(line: &str) -> f64 {
    let (_, rest) = line.split_once(':').unwrap();
    let (value, kind) = rest.split_once('|').unwrap();
    assert_eq!(kind, "ms", "not a timing: {line}");
    value.parse().unwrap()
}

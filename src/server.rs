use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use axum_statsd_metrics::{
    HandlerError, HealthSample, MetricContext, Metrics, RouteConfig,
};
use serde_json::{json, Value};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

/// Builds the demo application: instrumented routes from the root plugin
/// instance, a nested dynamic-mode instance under `/tenants`, and the health
/// endpoints.
pub fn create_router(metrics: Metrics, tenants: Metrics) -> Router {
    let instrumented: Router<Metrics> = metrics
        .router()
        // ── Tracked routes ──────────────────────────────────────
        .route("/api/users/:id", get(get_user), "getUser")
        .route("/api/orders", post(create_order), "createOrder")
        .route("/api/fail", get(always_fails), "alwaysFails")
        .route("/api/panic", get(always_panics), "alwaysPanics")
        // ── Untracked: hooks run, nothing is sent ───────────────
        .route("/api/ping", get(ping), RouteConfig::untracked())
        // ── Nested scope: labels start with `api.v2` ────────────
        .scope("/api/v2", |v2| v2.route("/users/:id", get(get_user), "getUser"))
        .into_router();

    let tenant_routes: Router<Metrics> = tenants
        .router()
        .route("/:tenant/report", get(tenant_report), "tenantReport")
        .into_router();

    Router::new()
        .merge(instrumented)
        .nest("/tenants", tenant_routes)
        // ── Health ──────────────────────────────────────────────
        .route("/api/health", get(get_health))
        .route("/api/health/stream", get(health_stream))
        .with_state(metrics)
        .layer(CorsLayer::permissive())
}

// ─── Handlers ────────────────────────────────────────────────────

async fn get_user(metrics: MetricContext, Path(id): Path<u64>) -> Json<Value> {
    metrics.send_set_metric("user", id);
    Json(json!({ "id": id, "label": metrics.get_metric_label() }))
}

async fn create_order(metrics: MetricContext, Json(order): Json<Value>) -> Result<(StatusCode, Json<Value>), HandlerError> {
    let items = order
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| HandlerError::new(StatusCode::BAD_REQUEST, "\"items\" must be an array"))?;

    metrics.send_gauge_metric("items", items.len() as f64);
    Ok((StatusCode::CREATED, Json(json!({ "accepted": items.len() }))))
}

async fn always_fails() -> Result<&'static str, HandlerError> {
    Err(HandlerError::new(StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable"))
}

async fn always_panics() -> &'static str {
    panic!("demo handler panic")
}

async fn ping(metrics: MetricContext) -> &'static str {
    // dropped, the route is untracked
    metrics.send_counter_metric("pong", None, None);
    "pong"
}

async fn tenant_report(metrics: MetricContext, Path(tenant): Path<String>) -> Json<Value> {
    Json(json!({ "tenant": tenant, "label": metrics.get_metric_label() }))
}

// ─── GET /api/health ─────────────────────────────────────────────
/// Latest process health sample, `null` until the first one is taken.

async fn get_health(State(metrics): State<Metrics>) -> Json<Option<HealthSample>> {
    Json(metrics.latest_health())
}

// ─── GET /api/health/stream ──────────────────────────────────────
/// Server-Sent Events endpoint pushing every new health sample as JSON.

async fn health_stream(
    State(metrics): State<Metrics>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, HandlerError> {
    let samples = metrics
        .subscribe_health()
        .ok_or_else(|| HandlerError::new(StatusCode::NOT_FOUND, "health sampling is disabled"))?;

    let stream = WatchStream::new(samples).filter_map(|sample| {
        let sample = sample?;
        let json = serde_json::to_string(&sample).unwrap_or_default();
        Some(Ok(Event::default().event("health").data(json)))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

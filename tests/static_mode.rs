mod support;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_statsd_metrics::{
    GetLabel, HandlerError, LabelMode, MemorySink, MetricContext, RouteConfig, RoutesOptions,
};
use support::{body_text, call, echo_label, lines_for, register, register_at, timing_value};

async fn ok() -> &'static str {
    "ok"
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

async fn unavailable() -> Result<&'static str, HandlerError> {
    Err(HandlerError::new(StatusCode::SERVICE_UNAVAILABLE, "try later"))
}

#[tokio::test]
async fn counts_requests_and_times_responses() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics.router().route("/", get(ok), "123").into_router();

    let response = call(&app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let lines = sink.lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert_eq!(lines[0], "123.requests:1|c");
    assert!(lines[1].starts_with("123.response_time:"));
    assert!(timing_value(&lines[1]) >= 0.0);
}

#[tokio::test]
async fn panicking_handler_counts_a_500() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics.router().route("/", get(boom), "123").into_router();

    let response = call(&app, "/").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let lines = sink.lines();
    assert_eq!(lines[0], "123.requests:1|c");
    assert_eq!(lines[1], "123.errors.500:1|c");
    assert!(lines[2].starts_with("123.response_time:"));
}

#[tokio::test]
async fn handler_error_status_is_used() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics.router().route("/busy", get(unavailable), "busy").into_router();

    let response = call(&app, "/busy").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(lines_for(&sink, "busy.errors.503"), vec!["busy.errors.503:1|c"]);
}

#[tokio::test]
async fn plain_error_status_is_not_an_error() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }), "missing")
        .into_router();

    call(&app, "/missing").await;
    assert!(!sink.has_sent(|line| line.contains(".errors.")));
}

#[tokio::test]
async fn scope_prefix_becomes_part_of_the_label() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .scope("/static/test", |scope| scope.route("/id", get(echo_label), "myId-1"))
        .into_router();

    let response = call(&app, "/static/test/id").await;
    assert_eq!(body_text(response).await, "static.test.myId-1");
    assert_eq!(lines_for(&sink, "static.test.myId-1.requests").len(), 1);
}

#[tokio::test]
async fn trailing_slash_scope_adds_no_empty_segment() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .scope("/api/", |api| {
            api.route("/x", get(echo_label), "id")
                .scope("/v2/", |v2| v2.route("/y", get(echo_label), "other"))
        })
        .into_router();

    assert_eq!(body_text(call(&app, "/api/x").await).await, "api.id");
    assert_eq!(body_text(call(&app, "/api/v2/y").await).await, "api.v2.other");
    assert_eq!(lines_for(&sink, "api.id.requests").len(), 1);
}

#[tokio::test]
async fn nested_plugin_instance_uses_its_prefix() {
    let sink = MemorySink::new();
    let metrics = register_at("/static/test", &sink, RoutesOptions::default()).await;
    let nested: Router = metrics.router().route("/id", get(echo_label), "myId-1").into_router();
    let app = Router::new().nest("/static/test", nested);

    let response = call(&app, "/static/test/id").await;
    assert_eq!(body_text(response).await, "static.test.myId-1");
}

#[tokio::test]
async fn untracked_route_gets_the_sentinel_label_and_sends_nothing() {
    let sink = MemorySink::new();
    let metrics = register(
        &sink,
        RoutesOptions {
            prefix: "prefix".into(),
            ..RoutesOptions::default()
        },
    )
    .await;
    let app: Router = metrics
        .router()
        .route("/", get(echo_label), RouteConfig::untracked())
        .route("/empty", get(echo_label), "")
        .into_router();

    assert_eq!(body_text(call(&app, "/").await).await, "prefix.noId");
    assert_eq!(body_text(call(&app, "/empty").await).await, "prefix.noId");
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn response_carries_the_request_label() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .scope("/a", |scope| scope.route("/b", post(echo_label), "r"))
        .into_router();

    let response = support::send(
        &app,
        axum::http::Request::post("/a/b")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    let bound = response.extensions().get::<MetricContext>().unwrap().clone();
    assert_eq!(bound.get_metric_label(), "a.r");
    assert_eq!(body_text(response).await, bound.get_metric_label());
}

#[tokio::test]
async fn custom_static_label_runs_once_per_route() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let sink = MemorySink::new();
    let metrics = register(
        &sink,
        RoutesOptions {
            mode: LabelMode::Static,
            get_label: Some(GetLabel::for_static(move |route| {
                seen.fetch_add(1, Ordering::SeqCst);
                format!("svc.{}.{}", route.config.effective_route_id(), route.path.trim_start_matches('/'))
            })),
            ..RoutesOptions::default()
        },
    )
    .await;
    let app: Router = metrics.router().route("/items", get(echo_label), "list").into_router();

    for _ in 0..3 {
        assert_eq!(body_text(call(&app, "/items").await).await, "svc.list.items");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(lines_for(&sink, "svc.list.items.requests").len(), 3);
}

#[tokio::test]
async fn extractor_rejects_uninstrumented_routes() {
    let app = Router::new().route("/", get(echo_label));
    let response = call(&app, "/").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

mod support;

use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        Request, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use axum_statsd_metrics::{
    ClientConfig, ClientOptions, HandlerError, HealthOptions, MemorySink, MetricContext, Metrics,
    PluginOptions, RouteConfig, RoutesOptions,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use support::{call, lines_for, register, send, timing_value};

async fn handler_metrics(metrics: MetricContext) -> &'static str {
    metrics.send_timing_metric("db", 4.5, None);
    metrics.send_counter_metric("cache_miss", Some(3), None);
    metrics.send_gauge_metric("queue", 12.0);
    metrics.send_set_metric("user", "alice");
    "done"
}

async fn failing() -> Result<&'static str, HandlerError> {
    Err(HandlerError::internal("nope"))
}

#[tokio::test]
async fn disabled_hooks_send_nothing() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::disabled()).await;
    let app: Router = metrics
        .router()
        .route("/", get(|| async { "ok" }), "r")
        .route("/fail", get(failing), "f")
        .into_router();

    call(&app, "/").await;
    let response = call(&app, "/fail").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(sink.lines().is_empty(), "{:?}", sink.lines());
}

#[tokio::test]
async fn errors_hook_can_be_turned_off_alone() {
    let sink = MemorySink::new();
    let metrics = register(
        &sink,
        RoutesOptions {
            errors: false,
            ..RoutesOptions::default()
        },
    )
    .await;
    let app: Router = metrics.router().route("/fail", get(failing), "f").into_router();

    call(&app, "/fail").await;
    assert_eq!(lines_for(&sink, "f.requests").len(), 1);
    assert_eq!(lines_for(&sink, "f.response_time").len(), 1);
    assert!(!sink.has_sent(|line| line.contains("errors")));
}

#[tokio::test]
async fn extractor_rejections_are_not_counted_as_errors() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .route("/items", post(|Json(item): Json<serde_json::Value>| async move { Json(item) }), "createItem")
        .into_router();

    let malformed = Request::post("/items")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&app, malformed).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(lines_for(&sink, "createItem.requests").len(), 1);
    assert_eq!(lines_for(&sink, "createItem.response_time").len(), 1);
    assert!(!sink.has_sent(|line| line.contains("errors")), "{:?}", sink.lines());
}

#[tokio::test]
async fn handlers_send_custom_metrics_under_the_route_label() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::disabled()).await;
    let app: Router = metrics
        .router()
        .scope("/jobs", |jobs| jobs.route("/run", get(handler_metrics), "runJob"))
        .into_router();

    call(&app, "/jobs/run").await;
    assert_eq!(
        sink.lines(),
        vec![
            "jobs.runJob.db:4.5|ms",
            "jobs.runJob.cache_miss:3|c",
            "jobs.runJob.queue:12|g",
            "jobs.runJob.user:alice|s",
        ]
    );
}

#[tokio::test]
async fn untracked_route_swallows_handler_metrics() {
    let sink = MemorySink::new();
    let metrics = register(&sink, RoutesOptions::default()).await;
    let app: Router = metrics
        .router()
        .route("/", get(handler_metrics), RouteConfig::untracked())
        .into_router();

    for _ in 0..5 {
        assert_eq!(call(&app, "/").await.status(), StatusCode::OK);
    }
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn request_and_response_sizes_are_timed() {
    let sink = MemorySink::new();
    let metrics = register(
        &sink,
        RoutesOptions {
            timing: false,
            hits: false,
            request_size: true,
            response_size: true,
            ..RoutesOptions::default()
        },
    )
    .await;
    let app: Router = metrics
        .router()
        .route("/upload", post(|body: String| async move { body.to_uppercase() }), "upload")
        .into_router();

    let declared = Request::post("/upload")
        .header(CONTENT_LENGTH, "5")
        .body(Body::from("hello"))
        .unwrap();
    send(&app, declared).await;

    let undeclared = Request::post("/upload").body(Body::from("abc")).unwrap();
    send(&app, undeclared).await;

    let requests: Vec<f64> = lines_for(&sink, "upload.request_size")
        .iter()
        .map(|line| timing_value(line))
        .collect();
    assert_eq!(requests, vec![5.0, 3.0]);

    let responses: Vec<f64> = lines_for(&sink, "upload.response_size")
        .iter()
        .map(|line| timing_value(line))
        .collect();
    assert_eq!(responses, vec![5.0, 3.0]);
}

#[tokio::test]
async fn empty_bodies_have_no_size_metric() {
    let sink = MemorySink::new();
    let metrics = register(
        &sink,
        RoutesOptions {
            request_size: true,
            response_size: true,
            ..RoutesOptions::default()
        },
    )
    .await;
    let app: Router = metrics
        .router()
        .route("/", get(|| async { StatusCode::NO_CONTENT }), "empty")
        .into_router();

    call(&app, "/").await;
    assert!(lines_for(&sink, "empty.request_size").is_empty());
    assert!(lines_for(&sink, "empty.response_size").is_empty());
    assert_eq!(lines_for(&sink, "empty.requests").len(), 1);
}

#[tokio::test]
async fn udp_collector_receives_namespaced_metrics() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap();

    let metrics = Metrics::register(PluginOptions {
        client: ClientOptions::Connect(ClientConfig {
            host: Some(format!("udp://{addr}")),
            namespace: Some("it".into()),
            ..ClientConfig::default()
        }),
        health: HealthOptions::Disabled,
        ..PluginOptions::default()
    })
    .await
    .unwrap();
    let app: Router = metrics.router().route("/", get(|| async { "ok" }), "123").into_router();
    call(&app, "/").await;

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while received.len() < 2 {
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), collector.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        received.push(String::from_utf8_lossy(&buf[..len]).into_owned());
    }

    assert_eq!(received[0], "it.123.requests:1|c");
    assert!(received[1].starts_with("it.123.response_time:"));
    metrics.close().await.unwrap();
}

#[tokio::test]
async fn tcp_collector_receives_newline_framed_metrics() {
    let collector = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap();

    let accept = tokio::spawn(async move {
        let (stream, _) = collector.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let mut received = Vec::new();
        while received.len() < 2 {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(line),
                None => break,
            }
        }
        received
    });

    let metrics = Metrics::register(PluginOptions {
        client: ClientOptions::Connect(ClientConfig {
            host: Some(format!("tcp://{addr}")),
            namespace: Some("it".into()),
            ..ClientConfig::default()
        }),
        health: HealthOptions::Disabled,
        ..PluginOptions::default()
    })
    .await
    .unwrap();
    let app: Router = metrics.router().route("/", get(|| async { "ok" }), "123").into_router();
    call(&app, "/").await;

    let received = tokio::time::timeout(Duration::from_secs(5), accept)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received[0], "it.123.requests:1|c");
    assert!(received[1].starts_with("it.123.response_time:"));
    metrics.close().await.unwrap();
}

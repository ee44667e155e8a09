use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::dispatch::MetricContext;
use crate::error::{HandlerError, RouteError};
use crate::hrtime::duration_to_ms;
use crate::label::{LabelRequest, RouteMetadata};
use crate::plugin::Shared;

/// State of the per-route middleware: the route's captured metadata and
/// the plugin instance it was registered through.
#[derive(Clone)]
pub(crate) struct RouteHooks {
    pub(crate) route: Arc<RouteMetadata>,
    pub(crate) shared: Arc<Shared>,
}

/// Lifecycle of one instrumented request:
///
///   1. bind the label (computed now in dynamic mode, cached in static mode)
///   2. `requests` counter and `request_size` timing
///   3. run the handler
///   4. `errors.<status>` counter if the response carries a [`RouteError`]
///   5. `response_size` and `response_time` timings
///
/// The [`MetricContext`] ends up in both the request and the response
/// extensions.
///
/// Only handler failures count as errors. Extractor rejections (a `400`,
/// `415` or `422` answered before the handler body runs) carry no
/// [`RouteError`] and show up in `requests` and `response_time` alone.
pub(crate) async fn route_lifecycle(
    State(hooks): State<RouteHooks>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let shared = &hooks.shared;
    let flags = shared.hooks;

    let (mut parts, body) = req.into_parts();
    let label = shared.resolver.on_request(&LabelRequest {
        instance: &shared.scope,
        request: &parts,
        route: &hooks.route,
    });
    let ctx = MetricContext::bind(label, Arc::clone(&hooks.route), shared.dispatcher.clone());

    // ── onRequest ───────────────────────────────────────────────
    if flags.hits {
        ctx.send_counter_metric("requests", None, None);
    }
    if flags.request_size {
        if let Some(size) = payload_size(&parts.headers, body.size_hint().exact()) {
            ctx.send_timing_metric("request_size", size as f64, None);
        }
    }
    parts.extensions.insert(ctx.clone());

    let mut response = next.run(Request::from_parts(parts, body)).await;

    // ── onError ─────────────────────────────────────────────────
    if flags.errors {
        if let Some(error) = response.extensions().get::<RouteError>() {
            let status = error.resolve_status(response.status());
            ctx.send_counter_metric(&format!("errors.{status}"), None, None);
        }
    }

    // ── onResponse ──────────────────────────────────────────────
    if flags.response_size {
        if let Some(size) = payload_size(response.headers(), response.body().size_hint().exact()) {
            ctx.send_timing_metric("response_size", size as f64, None);
        }
    }
    response.extensions_mut().insert(ctx.clone());
    if flags.timing {
        ctx.send_timing_metric("response_time", duration_to_ms(start.elapsed()), None);
    }

    response
}

/// Payload size from `content-length`, or from the body when the header
/// has not been set yet. `None` for missing or zero sizes.
fn payload_size(headers: &HeaderMap, exact_body_len: Option<u64>) -> Option<u64> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    declared.or(exact_body_len).filter(|size| *size > 0)
}

/// Turns a handler panic into a `500` tagged with a [`RouteError`], like an
/// unhandled exception would be answered.
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "route handler panicked".to_owned()
    };
    tracing::error!(panic = %message, "route handler panicked");

    let mut response = HandlerError::internal("Internal Server Error").into_response();
    response.extensions_mut().insert(RouteError::new(message));
    response
}

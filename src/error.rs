use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Everything that can go wrong while registering the plugin or talking to
/// the sink outside of the request path.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A malformed plugin option. The message names the offending key.
    #[error("{0}")]
    InvalidConfiguration(String),

    /// A custom client lacks one of the required sink functions.
    #[error("client does not implement {method} method.")]
    SinkCapabilityMissing { method: &'static str },

    /// The StatsD transport could not be set up.
    #[error("cannot connect to statsd at {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The sink reported a failure from `connect` or `close`.
    #[error("metric sink error: {0}")]
    Sink(String),
}

impl MetricsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub(crate) fn must_be_boolean(key: &str) -> Self {
        Self::invalid(format!("\"{key}\" must be a boolean."))
    }
}

// ─── Route errors ────────────────────────────────────────────────

/// Marker carried in the response extensions of a request whose handler
/// failed. The errors hook only fires for responses that carry one.
#[derive(Debug, Clone, Default)]
pub struct RouteError {
    /// Status code attached to the error itself, if any.
    pub status_code: Option<u16>,
    pub message: String,
}

impl RouteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Status used in the `errors.<status>` counter.
    ///
    /// The reply status wins when it already is an error status; otherwise
    /// the error's own code is used, falling back to `500`.
    pub fn resolve_status(&self, reply: StatusCode) -> u16 {
        if reply.as_u16() >= 400 {
            return reply.as_u16();
        }
        self.status_code.unwrap_or(500)
    }
}

/// Convenience error type for instrumented handlers.
///
/// Renders a JSON envelope and tags the response with a [`RouteError`] so
/// the errors counter picks it up.
#[derive(Debug)]
pub struct HandlerError {
    pub status: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error":  self.message,
            "status": self.status.as_u16(),
        });

        let mut response = (self.status, Json(body)).into_response();
        response
            .extensions_mut()
            .insert(RouteError::new(self.message).with_status(self.status.as_u16()));
        response
    }
}

use std::sync::Arc;

use super::prefix::normalize_framework_prefix;

/// Route id stored for routes registered without one. Such routes are not
/// tracked: their hooks run but nothing is sent.
pub const UNTRACKED_ROUTE_ID: &str = "noId";

/// Per-route metrics options given at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteConfig {
    pub route_id: Option<String>,
}

impl RouteConfig {
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: Some(route_id.into()),
        }
    }

    /// A route that opts out of metrics.
    pub fn untracked() -> Self {
        Self::default()
    }

    /// The effective id: the configured one, or the sentinel when it is
    /// missing or empty.
    pub fn effective_route_id(&self) -> &str {
        match self.route_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => UNTRACKED_ROUTE_ID,
        }
    }
}

impl From<&str> for RouteConfig {
    fn from(route_id: &str) -> Self {
        Self::new(route_id)
    }
}

/// Routing data captured once when a route is registered.
///
/// Never mutated afterwards; in static mode it also carries the label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMetadata {
    route_id: String,
    framework_prefix: Option<String>,
    routes_prefix: Arc<str>,
    cached_label: Option<Arc<str>>,
}

impl RouteMetadata {
    /// `scope_prefix` is the raw path prefix of the registering scope,
    /// `routes_prefix` the already normalized plugin prefix.
    pub fn capture(config: &RouteConfig, scope_prefix: Option<&str>, routes_prefix: Arc<str>) -> Self {
        Self {
            route_id: config.effective_route_id().to_owned(),
            framework_prefix: normalize_framework_prefix(scope_prefix),
            routes_prefix,
            cached_label: None,
        }
    }

    pub(crate) fn with_cached_label(mut self, label: Option<Arc<str>>) -> Self {
        self.cached_label = label;
        self
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn framework_prefix(&self) -> Option<&str> {
        self.framework_prefix.as_deref()
    }

    pub fn routes_prefix(&self) -> &str {
        &self.routes_prefix
    }

    /// Label computed at registration; only set in static mode.
    pub fn cached_label(&self) -> Option<&Arc<str>> {
        self.cached_label.as_ref()
    }

    pub fn is_tracked(&self) -> bool {
        self.route_id != UNTRACKED_ROUTE_ID
    }
}

/// The registration options of a route, as handed to a static label
/// function.
#[derive(Debug, Clone, Copy)]
pub struct RouteRegistration<'a> {
    /// Path relative to the registering scope.
    pub path: &'a str,
    /// Raw path prefix of the registering scope, e.g. `/static/test`.
    pub prefix: &'a str,
    pub config: &'a RouteConfig,
    pub metadata: &'a RouteMetadata,
}

use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;

use super::route::{RouteMetadata, RouteRegistration};
use super::LabelMode;
use crate::error::MetricsError;

pub type StaticLabelFn = Arc<dyn Fn(&RouteRegistration<'_>) -> String + Send + Sync>;
pub type DynamicLabelFn = Arc<dyn Fn(&LabelRequest<'_>) -> String + Send + Sync>;

/// User supplied label function. Which variant is accepted depends on the
/// configured mode.
#[derive(Clone)]
pub enum GetLabel {
    Static(StaticLabelFn),
    Dynamic(DynamicLabelFn),
}

impl GetLabel {
    pub fn for_static(f: impl Fn(&RouteRegistration<'_>) -> String + Send + Sync + 'static) -> Self {
        Self::Static(Arc::new(f))
    }

    pub fn for_dynamic(f: impl Fn(&LabelRequest<'_>) -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    fn mode(&self) -> LabelMode {
        match self {
            Self::Static(_) => LabelMode::Static,
            Self::Dynamic(_) => LabelMode::Dynamic,
        }
    }
}

impl fmt::Debug for GetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GetLabel::{:?}", self.mode())
    }
}

/// Plugin instance state a dynamic label function may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceScope {
    pub namespace: String,
    pub routes_prefix: Arc<str>,
    /// Normalized prefix of the scope the plugin was registered in.
    pub framework_prefix: Option<String>,
}

/// Input of a dynamic label function.
///
/// The label is assigned before the handler runs, so only the request head
/// is available; the response later carries the same label.
#[derive(Debug, Clone, Copy)]
pub struct LabelRequest<'a> {
    pub instance: &'a InstanceScope,
    pub request: &'a Parts,
    pub route: &'a RouteMetadata,
}

/// Joins `framework_prefix`, `routes_prefix` and `route_id` with dots,
/// skipping empty segments.
pub fn compose_label(framework_prefix: Option<&str>, routes_prefix: &str, route_id: &str) -> String {
    let mut label = String::with_capacity(
        framework_prefix.map_or(0, str::len) + routes_prefix.len() + route_id.len() + 2,
    );
    if let Some(prefix) = framework_prefix.filter(|p| !p.is_empty()) {
        label.push_str(prefix);
        label.push('.');
    }
    if !routes_prefix.is_empty() {
        label.push_str(routes_prefix);
        label.push('.');
    }
    label.push_str(route_id);
    label
}

pub fn default_static_label(registration: &RouteRegistration<'_>) -> String {
    let meta = registration.metadata;
    compose_label(meta.framework_prefix(), meta.routes_prefix(), meta.route_id())
}

/// Same composition as the static default, read from the metadata the
/// request's route captured.
pub fn default_dynamic_label(request: &LabelRequest<'_>) -> String {
    let meta = request.route;
    compose_label(meta.framework_prefix(), meta.routes_prefix(), meta.route_id())
}

/// Strategy deciding when labels are computed. Chosen once per plugin
/// instance.
#[derive(Clone)]
pub enum LabelResolver {
    /// Once per route, at registration.
    Static(StaticLabelFn),
    /// Once per request, before the handler.
    Dynamic(DynamicLabelFn),
}

impl LabelResolver {
    pub fn new(mode: LabelMode, get_label: Option<GetLabel>) -> Result<Self, MetricsError> {
        match (mode, get_label) {
            (LabelMode::Static, None) => Ok(Self::Static(Arc::new(default_static_label))),
            (LabelMode::Dynamic, None) => Ok(Self::Dynamic(Arc::new(default_dynamic_label))),
            (LabelMode::Static, Some(GetLabel::Static(f))) => Ok(Self::Static(f)),
            (LabelMode::Dynamic, Some(GetLabel::Dynamic(f))) => Ok(Self::Dynamic(f)),
            (mode, Some(_)) => Err(MetricsError::invalid(format!(
                "\"getLabel\" does not match the \"{mode}\" mode."
            ))),
        }
    }

    pub fn mode(&self) -> LabelMode {
        match self {
            Self::Static(_) => LabelMode::Static,
            Self::Dynamic(_) => LabelMode::Dynamic,
        }
    }

    /// Registration time step. Returns the label to cache on the route, if
    /// this strategy caches one.
    pub fn on_route(&self, registration: &RouteRegistration<'_>) -> Option<Arc<str>> {
        match self {
            Self::Static(get_label) => Some(Arc::from(get_label(registration))),
            Self::Dynamic(_) => None,
        }
    }

    /// Request time step: the label bound to this request.
    pub fn on_request(&self, request: &LabelRequest<'_>) -> Arc<str> {
        match self {
            Self::Static(_) => match request.route.cached_label() {
                Some(label) => Arc::clone(label),
                None => Arc::from(default_dynamic_label(request)),
            },
            Self::Dynamic(get_label) => Arc::from(get_label(request)),
        }
    }
}

impl fmt::Debug for LabelResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelResolver::{:?}", self.mode())
    }
}

//! Metric labels: the dotted prefix put in front of every per-route metric.
//!
//! A label joins the scope prefix of the route, the plugin's routes prefix
//! and the route id. [`LabelResolver`] decides whether it is computed once
//! per route (static mode) or once per request (dynamic mode).

mod prefix;
mod resolver;
mod route;

use std::fmt;
use std::str::FromStr;

pub use prefix::{
    join_scope_prefix, normalize_framework_prefix, normalize_routes_prefix, strip_prefix_dots,
};
pub use resolver::{
    compose_label, default_dynamic_label, default_static_label, DynamicLabelFn, GetLabel,
    InstanceScope, LabelRequest, LabelResolver, StaticLabelFn,
};
pub use route::{RouteConfig, RouteMetadata, RouteRegistration, UNTRACKED_ROUTE_ID};

use crate::error::MetricsError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelMode {
    #[default]
    Static,
    Dynamic,
}

impl LabelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for LabelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelMode {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(invalid_mode()),
        }
    }
}

pub(crate) fn invalid_mode() -> MetricsError {
    MetricsError::invalid("\"mode\" must be one of these values: \"static\", \"dynamic\".")
}

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::MethodRouter, Router};
use tower_http::catch_panic::CatchPanicLayer;

use crate::label::{join_scope_prefix, RouteConfig, RouteMetadata, RouteRegistration};
use crate::middleware::{panic_response, route_lifecycle, RouteHooks};
use crate::plugin::{Metrics, Shared};

/// Router builder that instruments every route it registers.
///
/// Labels are captured at registration, so the builder tracks the path
/// prefix of the scope it is in. Nest the resulting router under the same
/// prefix the plugin instance was registered at.
///
/// ```ignore
/// let app = metrics
///     .router()
///     .route("/users", get(list_users), "listUsers")
///     .scope("/admin", |admin| admin.route("/stats", get(stats), "adminStats"))
///     .into_router();
/// ```
pub struct MetricsRouter<S = ()> {
    router: Router<S>,
    shared: Arc<Shared>,
    prefix: String,
}

impl<S> MetricsRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(shared: Arc<Shared>, prefix: String) -> Self {
        Self {
            router: Router::new(),
            shared,
            prefix,
        }
    }

    /// Register an instrumented route. Route metadata and, in static mode,
    /// the label are computed here, once.
    pub fn route(mut self, path: &str, method_router: MethodRouter<S>, config: impl Into<RouteConfig>) -> Self {
        let config = config.into();
        let shared = &self.shared;

        let metadata = RouteMetadata::capture(
            &config,
            Some(&self.prefix),
            Arc::clone(&shared.scope.routes_prefix),
        );
        let label = shared.resolver.on_route(&RouteRegistration {
            path,
            prefix: &self.prefix,
            config: &config,
            metadata: &metadata,
        });
        let metadata = Arc::new(metadata.with_cached_label(label));

        tracing::debug!(
            path,
            prefix = %self.prefix,
            route_id = metadata.route_id(),
            label = ?metadata.cached_label(),
            tracked = metadata.is_tracked(),
            "instrumenting route"
        );

        let mut method_router = method_router;
        if shared.hooks.errors {
            method_router = method_router.layer(CatchPanicLayer::custom(panic_response));
        }
        let hooks = RouteHooks {
            route: metadata,
            shared: Arc::clone(shared),
        };
        method_router = method_router.route_layer(from_fn_with_state(hooks, route_lifecycle));

        self.router = self.router.route(path, method_router);
        self
    }

    /// Open a nested scope under `prefix`. Routes registered inside see the
    /// concatenated prefix.
    pub fn scope<F>(mut self, prefix: &str, build: F) -> Self
    where
        F: FnOnce(MetricsRouter<S>) -> MetricsRouter<S>,
    {
        let nested = build(MetricsRouter::new(
            Arc::clone(&self.shared),
            join_scope_prefix(&self.prefix, prefix),
        ));

        let mount = prefix.trim_end_matches('/');
        self.router = if mount.is_empty() {
            self.router.merge(nested.router)
        } else {
            self.router.nest(mount, nested.router)
        };
        self
    }

    /// Raw path prefix of the current scope.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::from_shared(Arc::clone(&self.shared))
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

impl<S> From<MetricsRouter<S>> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn from(router: MetricsRouter<S>) -> Self {
        router.into_router()
    }
}

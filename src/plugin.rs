//! The plugin instance.
//!
//! [`Metrics::register`] validates the options, builds the sink, connects
//! it and starts the health sampler. The returned handle hands out
//! [`MetricsRouter`]s whose routes are instrumented by this instance.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::{ClientOptions, HealthOptions, HookFlags, PluginOptions};
use crate::dispatch::Dispatcher;
use crate::error::MetricsError;
use crate::health::{send_health_data, HealthSample, HealthSampler};
use crate::label::{
    normalize_framework_prefix, normalize_routes_prefix, strip_prefix_dots, InstanceScope,
    LabelMode, LabelResolver,
};
use crate::router::MetricsRouter;
use crate::sink::{MetricSink, NoopClient, StatsdClient};
use crate::timerify::{self, OnSend, TimerRegistry, TimerifyOptions};

/// State shared by a plugin instance and every route it instruments.
pub(crate) struct Shared {
    pub(crate) scope: InstanceScope,
    /// Raw path prefix the instance was registered under.
    pub(crate) base_prefix: String,
    pub(crate) resolver: LabelResolver,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) hooks: HookFlags,
    owns_client: bool,
    timers: Arc<TimerRegistry>,
    sampler: Mutex<Option<HealthSampler>>,
}

/// Handle to a registered plugin instance. Cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    shared: Arc<Shared>,
}

impl Metrics {
    /// Register a plugin instance at the root of the application.
    pub async fn register(options: PluginOptions) -> Result<Self, MetricsError> {
        Self::setup(None, options).await
    }

    /// Register a plugin instance inside a nested scope. Routes of its
    /// [`router`](Self::router) are expected to be nested under `prefix`.
    pub async fn register_at(prefix: &str, options: PluginOptions) -> Result<Self, MetricsError> {
        Self::setup(Some(prefix), options).await
    }

    async fn setup(prefix: Option<&str>, options: PluginOptions) -> Result<Self, MetricsError> {
        let PluginOptions {
            client,
            routes,
            health,
        } = options;

        // Nothing is started before every option has been checked.
        health.validate()?;
        let hooks = routes.hooks();
        let resolver = LabelResolver::new(routes.mode, routes.get_label)?;
        let trimmed = normalize_routes_prefix(&routes.prefix);
        let routes_prefix: Arc<str> = Arc::from(strip_prefix_dots(&trimmed));
        let owns_client = !matches!(client, ClientOptions::Sink(_));
        let client = build_client(client)?;

        let connecting = Arc::clone(&client);
        tokio::task::spawn_blocking(move || connecting.connect())
            .await
            .map_err(|err| MetricsError::Sink(format!("connect task failed: {err}")))??;

        let sampler = match health {
            HealthOptions::Disabled => None,
            HealthOptions::Enabled { sample_interval } => {
                let sink = Arc::clone(&client);
                Some(HealthSampler::start(sample_interval, move |sample| {
                    send_health_data(sample, sink.as_ref());
                }))
            }
        };

        let scope = InstanceScope {
            namespace: client.namespace().to_owned(),
            routes_prefix,
            framework_prefix: normalize_framework_prefix(prefix),
        };

        tracing::info!(
            namespace = %scope.namespace,
            mode = %resolver.mode(),
            routes_prefix = %scope.routes_prefix,
            framework_prefix = ?scope.framework_prefix,
            health = sampler.is_some(),
            "metrics plugin registered"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                scope,
                base_prefix: prefix.unwrap_or_default().to_owned(),
                resolver,
                dispatcher: Dispatcher::new(client),
                hooks,
                owns_client,
                timers: TimerRegistry::new(),
                sampler: Mutex::new(sampler),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// A router whose routes are instrumented by this instance.
    pub fn router<S>(&self) -> MetricsRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        MetricsRouter::new(Arc::clone(&self.shared), self.shared.base_prefix.clone())
    }

    pub fn client(&self) -> &Arc<dyn MetricSink> {
        self.shared.dispatcher.client()
    }

    pub fn namespace(&self) -> &str {
        &self.shared.scope.namespace
    }

    /// The routes prefix after dot stripping.
    pub fn routes_prefix(&self) -> &str {
        &self.shared.scope.routes_prefix
    }

    /// Dotted form of the prefix the instance was registered under.
    pub fn framework_prefix(&self) -> Option<&str> {
        self.shared.scope.framework_prefix.as_deref()
    }

    pub fn mode(&self) -> LabelMode {
        self.shared.resolver.mode()
    }

    pub fn hooks(&self) -> HookFlags {
        self.shared.hooks
    }

    /// Latest health sample, `None` when health sampling is off or no sample
    /// has been taken yet.
    pub fn latest_health(&self) -> Option<HealthSample> {
        self.shared
            .sampler
            .lock()
            .as_ref()
            .and_then(HealthSampler::latest)
    }

    pub fn subscribe_health(&self) -> Option<watch::Receiver<Option<HealthSample>>> {
        self.shared.sampler.lock().as_ref().map(HealthSampler::subscribe)
    }

    pub fn timers(&self) -> &Arc<TimerRegistry> {
        &self.shared.timers
    }

    /// Time `fut` and send the elapsed milliseconds as a `name` timing.
    pub async fn timerify<F: Future>(&self, name: &str, fut: F) -> F::Output {
        let on_send = self.default_on_send();
        timerify::timerify(&self.shared.timers, name, &on_send, fut).await
    }

    pub async fn timerify_with<F: Future>(&self, options: TimerifyOptions, fut: F) -> F::Output {
        let on_send = options.on_send.unwrap_or_else(|| self.default_on_send());
        timerify::timerify(&self.shared.timers, &options.name, &on_send, fut).await
    }

    pub fn timerify_sync<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let on_send = self.default_on_send();
        timerify::timerify_sync(&self.shared.timers, name, &on_send, f)
    }

    fn default_on_send(&self) -> OnSend {
        let client = Arc::clone(self.client());
        Arc::new(move |name: &str, ms: f64| client.timing(name, ms, None))
    }

    /// Stop sampling, drop pending timings and close the sink.
    ///
    /// A sink passed in as [`ClientOptions::Sink`] belongs to the caller and
    /// is left open.
    pub async fn close(&self) -> Result<(), MetricsError> {
        if let Some(sampler) = self.shared.sampler.lock().take() {
            sampler.stop();
        }
        self.shared.timers.close();

        if self.shared.owns_client {
            let client = Arc::clone(self.client());
            let closed = tokio::task::spawn_blocking(move || client.close())
                .await
                .map_err(|err| MetricsError::Sink(format!("close task failed: {err}")))
                .and_then(|result| result);
            if let Err(err) = closed {
                tracing::warn!(error = %err, "metrics client did not close cleanly");
                return Err(err);
            }
        }

        tracing::info!(namespace = %self.namespace(), "metrics plugin closed");
        Ok(())
    }
}

fn build_client(options: ClientOptions) -> Result<Arc<dyn MetricSink>, MetricsError> {
    match options {
        ClientOptions::Connect(config) => {
            let Some(host) = config.host else {
                tracing::debug!("no statsd host configured, metrics are discarded");
                return Ok(Arc::new(NoopClient));
            };
            let mut builder = StatsdClient::builder(host).buffer_size(config.buffer_size);
            if let Some(namespace) = config.namespace {
                builder = builder.namespace(namespace);
            }
            if let Some(capacity) = config.queue_capacity {
                builder = builder.queue_capacity(capacity);
            }
            Ok(Arc::new(builder.build()?))
        }
        ClientOptions::Sink(sink) => Ok(sink),
        ClientOptions::Custom(custom) => Ok(Arc::new(custom.validate()?)),
    }
}

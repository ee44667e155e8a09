use std::fmt;
use std::sync::Arc;

use super::{MetricSink, STATSD_METHODS};
use crate::error::MetricsError;

type CountFn = Arc<dyn Fn(&str, i64, Option<f64>) + Send + Sync>;
type TimingFn = Arc<dyn Fn(&str, f64, Option<f64>) + Send + Sync>;
type GaugeFn = Arc<dyn Fn(&str, f64) + Send + Sync>;
type SetFn = Arc<dyn Fn(&str, &str) + Send + Sync>;
type LifecycleFn = Arc<dyn Fn() -> Result<(), MetricsError> + Send + Sync>;

/// A client assembled from individual callbacks.
///
/// Nothing forces every callback to be set; the plugin checks the client
/// when it registers and refuses it if one is missing.
#[derive(Clone, Default)]
pub struct CustomClient {
    namespace: Option<String>,
    counter: Option<CountFn>,
    timing: Option<TimingFn>,
    gauge: Option<GaugeFn>,
    set: Option<SetFn>,
    close: Option<LifecycleFn>,
    connect: Option<LifecycleFn>,
}

impl CustomClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn counter(mut self, f: impl Fn(&str, i64, Option<f64>) + Send + Sync + 'static) -> Self {
        self.counter = Some(Arc::new(f));
        self
    }

    pub fn timing(mut self, f: impl Fn(&str, f64, Option<f64>) + Send + Sync + 'static) -> Self {
        self.timing = Some(Arc::new(f));
        self
    }

    pub fn gauge(mut self, f: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        self.gauge = Some(Arc::new(f));
        self
    }

    pub fn set(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.set = Some(Arc::new(f));
        self
    }

    pub fn close(mut self, f: impl Fn() -> Result<(), MetricsError> + Send + Sync + 'static) -> Self {
        self.close = Some(Arc::new(f));
        self
    }

    pub fn connect(mut self, f: impl Fn() -> Result<(), MetricsError> + Send + Sync + 'static) -> Self {
        self.connect = Some(Arc::new(f));
        self
    }

    fn provides(&self, method: &str) -> bool {
        match method {
            "counter" => self.counter.is_some(),
            "timing" => self.timing.is_some(),
            "gauge" => self.gauge.is_some(),
            "set" => self.set.is_some(),
            "close" => self.close.is_some(),
            "connect" => self.connect.is_some(),
            _ => false,
        }
    }

    /// Check that every sink function is present, probing in
    /// [`STATSD_METHODS`] order.
    pub fn validate(self) -> Result<CustomSink, MetricsError> {
        let missing = |method| MetricsError::SinkCapabilityMissing { method };

        let counter = self.counter.ok_or_else(|| missing("counter"))?;
        let timing = self.timing.ok_or_else(|| missing("timing"))?;
        let gauge = self.gauge.ok_or_else(|| missing("gauge"))?;
        let set = self.set.ok_or_else(|| missing("set"))?;
        let close = self.close.ok_or_else(|| missing("close"))?;
        let connect = self.connect.ok_or_else(|| missing("connect"))?;

        Ok(CustomSink {
            namespace: self.namespace.unwrap_or_default(),
            counter,
            timing,
            gauge,
            set,
            close,
            connect,
        })
    }
}

impl fmt::Debug for CustomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provided: Vec<&str> = STATSD_METHODS
            .into_iter()
            .filter(|m| self.provides(m))
            .collect();
        f.debug_struct("CustomClient")
            .field("namespace", &self.namespace)
            .field("provided", &provided)
            .finish()
    }
}

/// A [`CustomClient`] that passed validation.
pub struct CustomSink {
    namespace: String,
    counter: CountFn,
    timing: TimingFn,
    gauge: GaugeFn,
    set: SetFn,
    close: LifecycleFn,
    connect: LifecycleFn,
}

impl MetricSink for CustomSink {
    fn counter(&self, name: &str, value: i64, sampling: Option<f64>) {
        (self.counter)(name, value, sampling);
    }

    fn timing(&self, name: &str, value: f64, sampling: Option<f64>) {
        (self.timing)(name, value, sampling);
    }

    fn gauge(&self, name: &str, value: f64) {
        (self.gauge)(name, value);
    }

    fn set(&self, name: &str, value: &str) {
        (self.set)(name, value);
    }

    fn connect(&self) -> Result<(), MetricsError> {
        (self.connect)()
    }

    fn close(&self) -> Result<(), MetricsError> {
        (self.close)()
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

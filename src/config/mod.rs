//! Plugin options.
//!
//! Options can be built in code or read from JSON with
//! [`PluginOptions::from_json`], which checks the shape of every key and
//! reports the first offending one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::MetricsError;
use crate::label::{invalid_mode, GetLabel, LabelMode};
use crate::sink::{CustomClient, MetricSink};

/// Default interval between two health samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1000);

const HOOK_KEYS: [&str; 5] = ["timing", "hits", "errors", "requestSize", "responseSize"];

// ─── Client ──────────────────────────────────────────────────────

/// Connection parameters for the built-in StatsD client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ClientConfig {
    /// `udp://host:port` or `tcp://host:port`. Without a host nothing is
    /// sent anywhere.
    pub host: Option<String>,
    pub namespace: Option<String>,
    /// UDP buffer in bytes, `0` disables buffering.
    pub buffer_size: usize,
    /// Bound of the UDP send queue.
    pub queue_capacity: Option<usize>,
}

/// Where metrics go.
#[derive(Clone)]
pub enum ClientOptions {
    /// Build a client from connection parameters.
    Connect(ClientConfig),
    /// Use an existing sink, possibly shared with other plugin instances.
    Sink(Arc<dyn MetricSink>),
    /// A callback client, validated at registration.
    Custom(CustomClient),
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::Connect(ClientConfig::default())
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(config) => f.debug_tuple("Connect").field(config).finish(),
            Self::Sink(sink) => f
                .debug_tuple("Sink")
                .field(&format_args!("namespace={:?}", sink.namespace()))
                .finish(),
            Self::Custom(client) => f.debug_tuple("Custom").field(client).finish(),
        }
    }
}

impl ClientOptions {
    fn from_json(value: &Value) -> Result<Self, MetricsError> {
        if !value.is_object() {
            return Err(MetricsError::invalid("\"client\" must be an object."));
        }
        let config = ClientConfig::deserialize(value)
            .map_err(|err| MetricsError::invalid(format!("invalid \"client\" options: {err}.")))?;
        Ok(Self::Connect(config))
    }
}

// ─── Routes ──────────────────────────────────────────────────────

/// Which lifecycle hooks are installed on each route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookFlags {
    pub timing: bool,
    pub hits: bool,
    pub errors: bool,
    pub request_size: bool,
    pub response_size: bool,
}

impl HookFlags {
    pub fn any(&self) -> bool {
        self.timing || self.hits || self.errors || self.request_size || self.response_size
    }
}

#[derive(Debug, Clone)]
pub struct RoutesOptions {
    pub mode: LabelMode,
    /// Custom prefix inserted between the scope prefix and the route id.
    pub prefix: String,
    /// `response_time` timing.
    pub timing: bool,
    /// `requests` counter.
    pub hits: bool,
    /// `errors.<status>` counter.
    pub errors: bool,
    /// `request_size` timing.
    pub request_size: bool,
    /// `response_size` timing.
    pub response_size: bool,
    pub get_label: Option<GetLabel>,
}

impl Default for RoutesOptions {
    fn default() -> Self {
        Self {
            mode: LabelMode::Static,
            prefix: String::new(),
            timing: true,
            hits: true,
            errors: true,
            request_size: false,
            response_size: false,
            get_label: None,
        }
    }
}

impl RoutesOptions {
    /// No route hooks at all; handlers can still send metrics by hand.
    pub fn disabled() -> Self {
        Self {
            timing: false,
            hits: false,
            errors: false,
            ..Self::default()
        }
    }

    pub fn hooks(&self) -> HookFlags {
        HookFlags {
            timing: self.timing,
            hits: self.hits,
            errors: self.errors,
            request_size: self.request_size,
            response_size: self.response_size,
        }
    }

    fn from_json(value: &Value) -> Result<Self, MetricsError> {
        match value {
            Value::Bool(true) => Ok(Self::default()),
            Value::Bool(false) => Ok(Self::disabled()),
            Value::Object(map) => Self::from_map(map),
            _ => Err(MetricsError::invalid(
                "\"routes\" must be a boolean or an object.",
            )),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, MetricsError> {
        let mut routes = Self::default();

        for key in HOOK_KEYS {
            let Some(value) = map.get(key) else {
                continue;
            };
            let enabled = value
                .as_bool()
                .ok_or_else(|| MetricsError::must_be_boolean(key))?;
            match key {
                "timing" => routes.timing = enabled,
                "hits" => routes.hits = enabled,
                "errors" => routes.errors = enabled,
                "requestSize" => routes.request_size = enabled,
                _ => routes.response_size = enabled,
            }
        }

        if let Some(prefix) = map.get("prefix") {
            routes.prefix = prefix
                .as_str()
                .ok_or_else(|| MetricsError::invalid("\"prefix\" must be a string."))?
                .to_owned();
        }

        if let Some(mode) = map.get("mode") {
            routes.mode = mode.as_str().ok_or_else(invalid_mode)?.parse()?;
        }

        // JSON has no callables
        if map.contains_key("getLabel") {
            return Err(MetricsError::invalid("\"getLabel\" must be a function."));
        }

        Ok(routes)
    }
}

// ─── Health ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOptions {
    Disabled,
    Enabled { sample_interval: Duration },
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self::Enabled {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthConfig {
    /// Milliseconds.
    sample_interval: Option<u64>,
}

impl HealthOptions {
    pub fn every(sample_interval: Duration) -> Self {
        Self::Enabled { sample_interval }
    }

    pub(crate) fn validate(&self) -> Result<(), MetricsError> {
        match self {
            Self::Enabled { sample_interval } if sample_interval.is_zero() => Err(
                MetricsError::invalid("\"sampleInterval\" must be a positive number."),
            ),
            _ => Ok(()),
        }
    }

    fn from_json(value: &Value) -> Result<Self, MetricsError> {
        match value {
            Value::Bool(true) => Ok(Self::default()),
            Value::Bool(false) => Ok(Self::Disabled),
            Value::Object(_) => {
                let config = HealthConfig::deserialize(value).map_err(|err| {
                    MetricsError::invalid(format!("invalid \"health\" options: {err}."))
                })?;
                let health = match config.sample_interval {
                    Some(ms) => Self::every(Duration::from_millis(ms)),
                    None => Self::default(),
                };
                health.validate()?;
                Ok(health)
            }
            _ => Err(MetricsError::invalid(
                "\"health\" must be a boolean or an object.",
            )),
        }
    }
}

// ─── Plugin ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PluginOptions {
    pub client: ClientOptions,
    pub routes: RoutesOptions,
    pub health: HealthOptions,
}

impl PluginOptions {
    /// Read options from their JSON representation.
    ///
    /// ```json
    /// {
    ///   "client": { "host": "udp://127.0.0.1:8125", "namespace": "api" },
    ///   "routes": { "mode": "static", "prefix": "v1", "requestSize": true },
    ///   "health": { "sampleInterval": 2000 }
    /// }
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, MetricsError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => return Err(MetricsError::invalid("options must be an object.")),
        };

        let mut options = Self::default();
        if let Some(routes) = map.get("routes") {
            options.routes = RoutesOptions::from_json(routes)?;
        }
        if let Some(health) = map.get("health") {
            options.health = HealthOptions::from_json(health)?;
        }
        if let Some(client) = map.get("client") {
            options.client = ClientOptions::from_json(client)?;
        }
        Ok(options)
    }

    pub fn with_client(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    pub fn with_routes(mut self, routes: RoutesOptions) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_health(mut self, health: HealthOptions) -> Self {
        self.health = health;
        self
    }
}

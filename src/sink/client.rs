use std::fmt::{self, Write as _};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::panic::RefUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadence::{BufferedUdpMetricSink, MetricSink as CadenceSink, QueuingMetricSink, UdpMetricSink};
use url::{Host, Url};

use super::tcp::TcpMetricSink;
use super::MetricSink;
use crate::error::MetricsError;

/// Called with every transport error. Sends never fail from the caller's
/// point of view.
pub type ErrorHandler = Arc<dyn Fn(&io::Error) + Send + Sync>;

fn log_error(err: &io::Error) {
    tracing::error!(error = %err, "failed to send metric");
}

// ─── Transport ───────────────────────────────────────────────────

/// Network transports are drained by cadence's background thread, so an
/// emit never waits on the collector.
enum Transport {
    Udp(QueuingMetricSink),
    /// The queue writes through `stream`. The handle is kept to open the
    /// connection eagerly and to flush the socket on close.
    Tcp {
        stream: Arc<TcpMetricSink>,
        queue: QueuingMetricSink,
    },
    Sink(Box<dyn CadenceSink + Send + Sync>),
}

impl Transport {
    fn emit(&self, line: &str) -> io::Result<usize> {
        match self {
            Self::Udp(sink) => sink.emit(line),
            Self::Tcp { queue, .. } => queue.emit(line),
            Self::Sink(sink) => sink.emit(line),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Self::Udp(sink) => sink.flush(),
            Self::Tcp { stream, queue } => {
                queue.flush()?;
                stream.flush()
            }
            Self::Sink(sink) => sink.flush(),
        }
    }

    fn connect(&self) -> io::Result<()> {
        match self {
            Self::Tcp { stream, .. } => stream.connect(),
            Self::Udp(_) | Self::Sink(_) => Ok(()),
        }
    }
}

/// Queue side of the shared TCP sink.
struct QueuedTcp(Arc<TcpMetricSink>);

// parking_lot locks do not poison; a panic inside emit leaves the stream slot usable.
impl RefUnwindSafe for QueuedTcp {}

impl CadenceSink for QueuedTcp {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        self.0.emit(metric)
    }

    fn flush(&self) -> io::Result<()> {
        self.0.flush()
    }
}

// ─── StatsdClient ────────────────────────────────────────────────

/// StatsD client formatting `<namespace>.<name>:<value>|<type>[|@rate]`
/// lines and handing them to a cadence transport.
pub struct StatsdClient {
    namespace: String,
    transport: Transport,
    on_error: ErrorHandler,
    closed: AtomicBool,
}

impl StatsdClient {
    /// Start building a client for a `udp://host:port` or
    /// `tcp://host:port` address.
    pub fn builder(host: impl Into<String>) -> StatsdClientBuilder {
        StatsdClientBuilder {
            host: host.into(),
            namespace: String::new(),
            buffer_size: 0,
            queue_capacity: None,
            on_error: None,
        }
    }

    /// Wrap any cadence sink, e.g. [`MemorySink`](super::MemorySink).
    pub fn from_sink<T>(namespace: impl Into<String>, sink: T) -> Self
    where
        T: CadenceSink + Send + Sync + 'static,
    {
        Self {
            namespace: namespace.into(),
            transport: Transport::Sink(Box::new(sink)),
            on_error: Arc::new(log_error),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }

    fn send(&self, name: &str, value: fmt::Arguments<'_>, kind: &str, sampling: Option<f64>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let rate = match sampling {
            Some(rate) if rate < 1.0 => {
                if rand::random::<f64>() >= rate {
                    return;
                }
                Some(rate)
            }
            _ => None,
        };

        let mut line = String::with_capacity(self.namespace.len() + name.len() + 24);
        if !self.namespace.is_empty() {
            line.push_str(&self.namespace);
            line.push('.');
        }
        // Writing into a String cannot fail
        let _ = write!(line, "{name}:{value}|{kind}");
        if let Some(rate) = rate {
            let _ = write!(line, "|@{rate}");
        }

        if let Err(err) = self.transport.emit(&line) {
            (self.on_error)(&err);
        }
    }
}

impl MetricSink for StatsdClient {
    fn counter(&self, name: &str, value: i64, sampling: Option<f64>) {
        self.send(name, format_args!("{value}"), "c", sampling);
    }

    fn timing(&self, name: &str, value: f64, sampling: Option<f64>) {
        self.send(name, format_args!("{value}"), "ms", sampling);
    }

    fn gauge(&self, name: &str, value: f64) {
        self.send(name, format_args!("{value}"), "g", None);
    }

    fn set(&self, name: &str, value: &str) {
        self.send(name, format_args!("{value}"), "s", None);
    }

    fn connect(&self) -> Result<(), MetricsError> {
        self.transport
            .connect()
            .map_err(|err| MetricsError::Sink(err.to_string()))
    }

    fn close(&self) -> Result<(), MetricsError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.transport
            .flush()
            .map_err(|err| MetricsError::Sink(err.to_string()))
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

// ─── Builder ─────────────────────────────────────────────────────

pub struct StatsdClientBuilder {
    host: String,
    namespace: String,
    buffer_size: usize,
    queue_capacity: Option<usize>,
    on_error: Option<ErrorHandler>,
}

impl StatsdClientBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Bytes buffered before a UDP datagram is written. `0` sends every
    /// metric in its own datagram.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Bound the send queue. Unbounded by default.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn on_error(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = Some(on_error);
        self
    }

    pub fn build(self) -> Result<StatsdClient, MetricsError> {
        let url = Url::parse(&self.host).map_err(|err| {
            MetricsError::invalid(format!("\"host\" is not a valid url: {err}."))
        })?;
        let addr = resolve(&url).map_err(|source| MetricsError::Connect {
            host: self.host.clone(),
            source,
        })?;

        let transport = match url.scheme() {
            "udp" => self.udp_transport(addr),
            "tcp" => Ok(self.tcp_transport(addr)),
            other => {
                return Err(MetricsError::invalid(format!(
                    "unsupported statsd protocol \"{other}\", expected \"udp\" or \"tcp\"."
                )))
            }
        }
        .map_err(|source| MetricsError::Connect {
            host: self.host.clone(),
            source,
        })?;

        Ok(StatsdClient {
            namespace: self.namespace,
            transport,
            on_error: self.on_error.unwrap_or_else(|| Arc::new(log_error)),
            closed: AtomicBool::new(false),
        })
    }

    fn udp_transport(&self, addr: SocketAddr) -> io::Result<Transport> {
        let bind = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind)?;

        let queued = if self.buffer_size > 0 {
            socket.set_nonblocking(true)?;
            let sink = BufferedUdpMetricSink::with_capacity(addr, socket, self.buffer_size)
                .map_err(io::Error::other)?;
            self.queue(sink)
        } else {
            let sink = UdpMetricSink::from(addr, socket).map_err(io::Error::other)?;
            self.queue(sink)
        };
        Ok(Transport::Udp(queued))
    }

    fn tcp_transport(&self, addr: SocketAddr) -> Transport {
        let stream = Arc::new(TcpMetricSink::new(addr));
        let queue = self.queue(QueuedTcp(Arc::clone(&stream)));
        Transport::Tcp { stream, queue }
    }

    fn queue<T>(&self, sink: T) -> QueuingMetricSink
    where
        T: CadenceSink + Send + Sync + RefUnwindSafe + 'static,
    {
        match self.queue_capacity {
            Some(capacity) => QueuingMetricSink::with_capacity(sink, capacity),
            None => QueuingMetricSink::from(sink),
        }
    }
}

fn resolve(url: &Url) -> io::Result<SocketAddr> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_owned(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "missing host in statsd url",
            ))
        }
    };
    let port = url.port().unwrap_or(cadence::DEFAULT_PORT);

    (host.as_str(), port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{host}:{port} did not resolve to any address"),
        )
    })
}

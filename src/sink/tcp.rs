use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use parking_lot::Mutex;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Newline framed StatsD over TCP.
///
/// The stream is opened by `connect` or lazily by the first emit, and
/// dropped on a write error so the next metric reconnects. Writes block,
/// so the client only reaches this sink through a cadence queue.
pub struct TcpMetricSink {
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpMetricSink {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stream: Mutex::new(None),
        }
    }

    pub fn connect(&self) -> io::Result<()> {
        let mut guard = self.stream.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    fn open(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl cadence::MetricSink for TcpMetricSink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        let mut guard = self.stream.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        let mut frame = Vec::with_capacity(metric.len() + 1);
        frame.extend_from_slice(metric.as_bytes());
        frame.push(b'\n');

        let result = match guard.as_mut() {
            Some(stream) => stream.write_all(&frame),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        };
        if let Err(err) = result {
            *guard = None;
            return Err(err);
        }
        Ok(frame.len())
    }

    fn flush(&self) -> io::Result<()> {
        match self.stream.lock().as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }
}

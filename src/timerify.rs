//! Timing arbitrary operations.
//!
//! In-flight timings are tracked by a [`TimerRegistry`] owned by the plugin
//! instance. Closing the instance clears it, and timings that complete
//! afterwards are dropped instead of sent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::hrtime::duration_to_ms;

/// Receives the name and the elapsed milliseconds of a timed operation.
pub type OnSend = Arc<dyn Fn(&str, f64) + Send + Sync>;

#[derive(Debug, Default)]
pub struct TimerRegistry {
    pending: Mutex<HashMap<String, usize>>,
    closed: AtomicBool,
}

impl TimerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin(self: &Arc<Self>, name: &str) -> PendingTimer {
        *self.pending.lock().entry(name.to_owned()).or_insert(0) += 1;
        PendingTimer {
            registry: Arc::clone(self),
            name: name.to_owned(),
            started: Instant::now(),
            released: false,
        }
    }

    /// Number of timings in flight under `name`.
    pub fn pending(&self, name: &str) -> usize {
        self.pending.lock().get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.lock().clear();
    }

    fn release(&self, name: &str) {
        let mut pending = self.pending.lock();
        if let Some(count) = pending.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                pending.remove(name);
            }
        }
    }
}

/// An in-flight timing. Dropping it without [`finish`](Self::finish)
/// discards the measurement.
#[derive(Debug)]
pub struct PendingTimer {
    registry: Arc<TimerRegistry>,
    name: String,
    started: Instant,
    released: bool,
}

impl PendingTimer {
    /// Stop the clock. `None` once the registry has been closed.
    pub fn finish(mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        self.registry.release(&self.name);
        self.released = true;
        if self.registry.closed.load(Ordering::Acquire) {
            return None;
        }
        Some(elapsed)
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(&self.name);
        }
    }
}

/// Options of a single timed operation.
#[derive(Clone)]
pub struct TimerifyOptions {
    pub name: String,
    /// Where the elapsed milliseconds go. Defaults to a timing on the
    /// plugin's sink.
    pub on_send: Option<OnSend>,
}

impl TimerifyOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_send: None,
        }
    }

    pub fn on_send(mut self, on_send: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(on_send));
        self
    }
}

/// Await `fut` and report how long it took.
pub async fn timerify<F>(registry: &Arc<TimerRegistry>, name: &str, on_send: &OnSend, fut: F) -> F::Output
where
    F: Future,
{
    let timer = registry.begin(name);
    let output = fut.await;
    if let Some(elapsed) = timer.finish() {
        on_send(name, duration_to_ms(elapsed));
    }
    output
}

/// Run `f` and report how long it took.
pub fn timerify_sync<T>(registry: &Arc<TimerRegistry>, name: &str, on_send: &OnSend, f: impl FnOnce() -> T) -> T {
    let timer = registry.begin(name);
    let output = f();
    if let Some(elapsed) = timer.finish() {
        on_send(name, duration_to_ms(elapsed));
    }
    output
}

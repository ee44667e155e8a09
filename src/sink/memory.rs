use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// cadence sink keeping every formatted line in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a
/// [`StatsdClient`](super::StatsdClient) and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// True when at least one line satisfies `predicate`.
    pub fn has_sent(&self, predicate: impl Fn(&str) -> bool) -> bool {
        self.lines.lock().iter().any(|line| predicate(line))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl cadence::MetricSink for MemorySink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        self.lines.lock().push(metric.to_owned());
        Ok(metric.len())
    }
}

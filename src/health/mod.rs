//! Process health sampling.
//!
//! A background task wakes up on a fixed interval, reads memory and CPU
//! usage of the current process and measures how late the runtime woke it
//! up. Each sample is reported as gauges and published on a watch channel.

use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::hrtime::duration_to_ms;
use crate::sink::MetricSink;

/// One health reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealthSample {
    /// Resident set size in bytes.
    pub rss: u64,
    /// Virtual memory in bytes.
    pub virtual_memory: u64,
    /// CPU usage in percent, may exceed 100 on several cores.
    pub cpu: f64,
    /// How late the sampler tick fired, in milliseconds.
    pub event_loop_delay: f64,
}

/// Report a sample as `process.*` gauges.
pub fn send_health_data(sample: &HealthSample, sink: &dyn MetricSink) {
    sink.gauge("process.mem.rss", sample.rss as f64);
    sink.gauge("process.mem.virtual", sample.virtual_memory as f64);
    sink.gauge("process.eventLoopDelay", sample.event_loop_delay);
    sink.gauge("process.cpu", sample.cpu);
}

/// Handle to the running sampler task. Dropping it stops sampling.
pub struct HealthSampler {
    latest: watch::Receiver<Option<HealthSample>>,
    task: JoinHandle<()>,
}

impl HealthSampler {
    /// Spawn the sampler on the current tokio runtime.
    pub fn start<F>(sample_interval: Duration, on_sample: F) -> Self
    where
        F: Fn(&HealthSample) + Send + Sync + 'static,
    {
        let (tx, latest) = watch::channel(None);

        let task = tokio::spawn(async move {
            let mut stats = ProcessStats::new();

            let mut interval = tokio::time::interval(sample_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = IntervalStream::new(interval);

            // The first tick fires immediately; use it as the CPU baseline.
            if ticks.next().await.is_some() {
                stats.refresh();
            }

            while let Some(scheduled) = ticks.next().await {
                let sample = stats.sample(scheduled.elapsed());
                on_sample(&sample);
                if tx.send(Some(sample)).is_err() {
                    tracing::trace!("health sample has no watchers");
                }
            }
        });

        tracing::debug!(interval_ms = sample_interval.as_millis() as u64, "health sampler started");
        Self { latest, task }
    }

    /// Most recent sample, if one was taken.
    pub fn latest(&self) -> Option<HealthSample> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<HealthSample>> {
        self.latest.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HealthSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─── Process stats ───────────────────────────────────────────────

struct ProcessStats {
    system: System,
    pid: Option<Pid>,
}

impl ProcessStats {
    fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::warn!(error = err, "cannot resolve current pid, memory and cpu gauges will be zero");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    fn refresh(&mut self) {
        if let Some(pid) = self.pid {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );
        }
    }

    fn sample(&mut self, delay: Duration) -> HealthSample {
        self.refresh();
        let mut sample = HealthSample {
            event_loop_delay: duration_to_ms(delay),
            ..HealthSample::default()
        };
        if let Some(process) = self.pid.and_then(|pid| self.system.process(pid)) {
            sample.rss = process.memory();
            sample.virtual_memory = process.virtual_memory();
            sample.cpu = f64::from(process.cpu_usage());
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::sink::{MemorySink, StatsdClient};

    #[test]
    fn sends_process_gauges() {
        let sink = MemorySink::new();
        let client = StatsdClient::from_sink("health_test", sink.clone());
        let sample = HealthSample {
            rss: 2048,
            virtual_memory: 4096,
            cpu: 12.5,
            event_loop_delay: 0.75,
        };

        send_health_data(&sample, &client);

        assert_eq!(
            sink.lines(),
            vec![
                "health_test.process.mem.rss:2048|g",
                "health_test.process.mem.virtual:4096|g",
                "health_test.process.eventLoopDelay:0.75|g",
                "health_test.process.cpu:12.5|g",
            ]
        );
    }

    #[tokio::test]
    async fn publishes_samples_until_stopped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = seen.clone();
        let sampler = HealthSampler::start(Duration::from_millis(10), move |sample| {
            collected.lock().push(*sample);
        });

        let mut rx = sampler.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();

        let latest = sampler.latest().unwrap();
        assert!(latest.event_loop_delay >= 0.0);
        assert!(!seen.lock().is_empty());

        sampler.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sampler.is_running());
    }
}

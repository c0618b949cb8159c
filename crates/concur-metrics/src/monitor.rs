//! Component B: periodic CPU/memory sampling into bounded ring histories.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use concur_core::clock::Clock;
use concur_core::sample::{ProcessStatsSnapshot, SampleRing};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics_source::ProcessMetricsSource;

struct Histories {
    cpu: SampleRing,
    memory: SampleRing,
    last_sample_at: Option<std::time::Instant>,
}

/// Samples a process on a tick and keeps bounded CPU/memory histories.
///
/// Must be refreshed (via [`Self::tick`], called directly or from [`Self::start`]'s
/// background task) before [`Self::stats`] reflects anything but an empty snapshot.
pub struct ProcessMonitor {
    source: Mutex<Box<dyn ProcessMetricsSource>>,
    clock: Arc<dyn Clock>,
    effective_cores: u32,
    histories: Mutex<Histories>,
    cancel: CancellationToken,
}

impl ProcessMonitor {
    /// Builds a monitor over `source`, normalizing CPU samples to `effective_cores`.
    pub fn new(
        source: Box<dyn ProcessMetricsSource>,
        clock: Arc<dyn Clock>,
        effective_cores: u32,
        history_size: usize,
    ) -> Self {
        Self {
            source: Mutex::new(source),
            clock,
            effective_cores: effective_cores.max(1),
            histories: Mutex::new(Histories {
                cpu: SampleRing::new(history_size),
                memory: SampleRing::new(history_size),
                last_sample_at: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Samples the process once, appending to both histories. Swallows any metrics-source
    /// failure (an exited child process is expected) and simply skips the sample.
    pub fn tick(&self) {
        let reading = {
            let mut source = self.lock_source();
            source.read()
        };
        let reading = match reading {
            Ok(reading) => reading,
            Err(err) => {
                debug!(error = %err, "process sample skipped");
                return;
            }
        };

        let now = self.clock.now();
        let mut histories = self.lock_histories();
        // No CPU baseline on the first sample; sysinfo's own internal delta isn't valid yet.
        if histories.last_sample_at.is_some() {
            let cpu_percent = (reading.cpu_percent / f64::from(self.effective_cores)).round();
            histories.cpu.push(cpu_percent);
        }
        histories.memory.push(reading.memory_bytes);
        histories.last_sample_at = Some(now);
    }

    /// Returns an immutable copy of both histories.
    #[must_use]
    pub fn stats(&self) -> ProcessStatsSnapshot {
        let histories = self.lock_histories();
        ProcessStatsSnapshot {
            cpu_percent: histories.cpu.to_vec(),
            memory_bytes: histories.memory.to_vec(),
        }
    }

    /// Spawns the periodic tick task, bound to this monitor's cancellation token. The
    /// returned handle may be dropped; the task still runs until [`Self::dispose`].
    pub fn start(self: &Arc<Self>, sample_interval: Duration) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut tick = interval(sample_interval);
            info!(interval_ms = sample_interval.as_millis(), "process monitor started");
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!("process monitor shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        monitor.tick();
                    }
                }
            }
            debug!("process monitor task completed");
        })
    }

    /// Stops the background tick task. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    fn lock_source(&self) -> std::sync::MutexGuard<'_, Box<dyn ProcessMetricsSource>> {
        self.source.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_histories(&self) -> std::sync::MutexGuard<'_, Histories> {
        self.histories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricsError;
    use crate::metrics_source::RawReading;
    use concur_core::clock::ManualClock;

    #[derive(Debug)]
    struct QueuedSource {
        readings: std::collections::VecDeque<RawReading>,
    }

    impl ProcessMetricsSource for QueuedSource {
        fn read(&mut self) -> Result<RawReading, MetricsError> {
            self.readings
                .pop_front()
                .ok_or(MetricsError::ProcessNotFound { pid: 0 })
        }
    }

    fn reading(cpu: f64, mem: f64) -> RawReading {
        RawReading {
            cpu_percent: cpu,
            memory_bytes: mem,
        }
    }

    #[test]
    fn first_tick_skips_cpu_sample_but_keeps_memory() {
        let source = QueuedSource {
            readings: vec![reading(50.0, 1000.0)].into(),
        };
        let clock = Arc::new(ManualClock::new());
        let monitor = ProcessMonitor::new(Box::new(source), clock, 1, 10);
        monitor.tick();
        let stats = monitor.stats();
        assert!(stats.cpu_percent.is_empty());
        assert_eq!(stats.memory_bytes, vec![1000.0]);
    }

    #[test]
    fn subsequent_ticks_record_cpu_samples() {
        let source = QueuedSource {
            readings: vec![reading(50.0, 1000.0), reading(60.0, 1100.0)].into(),
        };
        let clock = Arc::new(ManualClock::new());
        let monitor = ProcessMonitor::new(Box::new(source), clock.clone(), 1, 10);
        monitor.tick();
        clock.advance(Duration::from_secs(1));
        monitor.tick();
        let stats = monitor.stats();
        assert_eq!(stats.cpu_percent.len(), 1);
        assert_eq!(stats.memory_bytes, vec![1000.0, 1100.0]);
    }

    #[test]
    fn failing_read_is_swallowed_and_skipped() {
        let source = QueuedSource {
            readings: std::collections::VecDeque::new(),
        };
        let clock = Arc::new(ManualClock::new());
        let monitor = ProcessMonitor::new(Box::new(source), clock, 1, 10);
        monitor.tick();
        let stats = monitor.stats();
        assert!(stats.cpu_percent.is_empty());
        assert!(stats.memory_bytes.is_empty());
    }

    #[test]
    fn history_never_exceeds_configured_capacity() {
        let mut readings = std::collections::VecDeque::new();
        for i in 0..50 {
            readings.push_back(reading(10.0, f64::from(i)));
        }
        let source = QueuedSource { readings };
        let clock = Arc::new(ManualClock::new());
        let monitor = ProcessMonitor::new(Box::new(source), clock.clone(), 1, 10);
        for _ in 0..50 {
            clock.advance(Duration::from_secs(1));
            monitor.tick();
        }
        let stats = monitor.stats();
        assert!(stats.memory_bytes.len() <= 10);
        assert!(stats.cpu_percent.len() <= 10);
    }
}

//! Component C: aggregates the host process's samples and every registered child's samples
//! into a single health verdict.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use concur_core::clock::Clock;
use concur_core::health::HealthVerdict;
use sysinfo::Pid;
use tracing::info;

use crate::metrics_source::SysinfoMetricsSource;
use crate::monitor::ProcessMonitor;
use crate::plan::PlanInfo;

/// Minimum samples (§4.C "recent window") a process's history must hold before it
/// contributes to the aggregate instead of yielding `Unknown`.
pub const MIN_SAMPLE_COUNT: usize = 5;

/// CPU overload threshold, as a percentage of effective cores.
pub const DEFAULT_CPU_THRESHOLD_PERCENT: f64 = 80.0;

/// Owns the host process's monitor plus one monitor per registered child, and aggregates
/// their recent samples into a single [`HealthVerdict`].
pub struct HostHealthMonitor {
    host_monitor: Arc<ProcessMonitor>,
    children: RwLock<HashMap<u32, Arc<ProcessMonitor>>>,
    clock: Arc<dyn Clock>,
    effective_cores: u32,
    evaluate_memory: bool,
    memory_threshold_bytes: f64,
    sample_history_size: usize,
    min_sample_count: usize,
    cpu_threshold_percent: f64,
    memory_threshold_fraction: f64,
}

impl HostHealthMonitor {
    /// Builds the monitor for the current host process. `plan` decides whether memory is
    /// evaluated at all and what per-core budget to apply.
    pub fn new(
        clock: Arc<dyn Clock>,
        plan: &dyn PlanInfo,
        true_core_count: u32,
        sample_history_size: usize,
        min_sample_count: usize,
        cpu_threshold_fraction: f64,
        memory_threshold_fraction: f64,
    ) -> Self {
        let effective_cores = plan.effective_cores(true_core_count);
        let memory_threshold_bytes =
            f64::from(effective_cores) * plan.per_core_memory_budget_bytes() * memory_threshold_fraction;

        let host_source = Box::new(SysinfoMetricsSource::current_process());
        let host_monitor = Arc::new(ProcessMonitor::new(
            host_source,
            clock.clone(),
            effective_cores,
            sample_history_size,
        ));

        Self {
            host_monitor,
            children: RwLock::new(HashMap::new()),
            clock,
            effective_cores,
            evaluate_memory: plan.is_metered(),
            memory_threshold_bytes,
            sample_history_size,
            min_sample_count,
            cpu_threshold_percent: cpu_threshold_fraction * 100.0,
            memory_threshold_fraction,
        }
    }

    /// The host's own monitor, for starting/disposing its background tick.
    #[must_use]
    pub fn host_monitor(&self) -> &Arc<ProcessMonitor> {
        &self.host_monitor
    }

    /// Registers a child process by pid, starting a monitor for it. Re-registering the same
    /// pid replaces the existing monitor.
    pub fn register(&self, pid: u32, interval: Duration) -> Arc<ProcessMonitor> {
        let source = Box::new(SysinfoMetricsSource::for_pid(Pid::from_u32(pid)));
        let monitor = Arc::new(ProcessMonitor::new(
            source,
            self.clock.clone(),
            self.effective_cores,
            self.sample_history_size,
        ));
        monitor.start(interval);
        let previous = self
            .lock_children_write()
            .insert(pid, Arc::clone(&monitor));
        if let Some(previous) = previous {
            previous.dispose();
        }
        info!(pid, "child process registered");
        monitor
    }

    /// Removes and disposes a child monitor. No-op if the pid was not registered.
    pub fn unregister(&self, pid: u32) {
        if let Some(monitor) = self.lock_children_write().remove(&pid) {
            monitor.dispose();
            info!(pid, "child process unregistered");
        }
    }

    /// Computes the aggregate health verdict per §4.C.
    #[must_use]
    pub fn status(&self) -> HealthVerdict {
        let host_stats = self.host_monitor.stats();
        let child_monitors: Vec<Arc<ProcessMonitor>> =
            self.lock_children_read().values().cloned().collect();
        let child_stats: Vec<_> = child_monitors.iter().map(|m| m.stats()).collect();

        let cpu_verdict = self.cpu_verdict(&host_stats, &child_stats);
        let memory_verdict = if self.evaluate_memory {
            self.memory_verdict(&host_stats, &child_stats)
        } else {
            HealthVerdict::Unknown
        };

        HealthVerdict::combine([cpu_verdict, memory_verdict])
    }

    fn cpu_verdict(
        &self,
        host_stats: &concur_core::sample::ProcessStatsSnapshot,
        child_stats: &[concur_core::sample::ProcessStatsSnapshot],
    ) -> HealthVerdict {
        let Some(host_avg) = host_stats.recent_cpu_average(self.min_sample_count) else {
            return HealthVerdict::Unknown;
        };
        let total: f64 = host_avg
            + child_stats
                .iter()
                .filter_map(|s| s.recent_cpu_average(self.min_sample_count))
                .sum::<f64>();
        if total.round() >= self.cpu_threshold_percent {
            HealthVerdict::Overloaded
        } else {
            HealthVerdict::Ok
        }
    }

    fn memory_verdict(
        &self,
        host_stats: &concur_core::sample::ProcessStatsSnapshot,
        child_stats: &[concur_core::sample::ProcessStatsSnapshot],
    ) -> HealthVerdict {
        let Some(host_avg) = host_stats.recent_memory_average(self.min_sample_count) else {
            return HealthVerdict::Unknown;
        };
        let total: f64 = host_avg
            + child_stats
                .iter()
                .filter_map(|s| s.recent_memory_average(self.min_sample_count))
                .sum::<f64>();
        if total.round() >= self.memory_threshold_bytes {
            HealthVerdict::Overloaded
        } else {
            HealthVerdict::Ok
        }
    }

    fn lock_children_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u32, Arc<ProcessMonitor>>> {
        self.children
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_children_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, Arc<ProcessMonitor>>> {
        self.children
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HostHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHealthMonitor")
            .field("effective_cores", &self.effective_cores)
            .field("evaluate_memory", &self.evaluate_memory)
            .field("memory_threshold_bytes", &self.memory_threshold_bytes)
            .field("child_count", &self.lock_children_read().len())
            .finish_non_exhaustive()
    }
}

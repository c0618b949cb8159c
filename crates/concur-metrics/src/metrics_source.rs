//! Component A: a process's raw CPU and memory readings, refreshed on demand.

use std::fmt;

use sysinfo::{Pid, System};

use crate::error::MetricsError;

/// A single raw reading: CPU usage as a percentage of one core (sysinfo's convention — a
/// process pinned to two cores at full tilt reads ~200.0), and current resident bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub cpu_percent: f64,
    pub memory_bytes: f64,
}

/// Exposes a process's current CPU and memory reading. Implementations must refresh any
/// cached OS view before returning a value, so repeated calls reflect new samples rather
/// than a stale cache.
pub trait ProcessMetricsSource: fmt::Debug + Send + Sync {
    /// Refreshes the OS view and returns the current reading, or an error if the process is
    /// no longer visible.
    fn read(&mut self) -> Result<RawReading, MetricsError>;
}

/// [`ProcessMetricsSource`] backed by `sysinfo`.
///
/// Mirrors the refresh discipline `atmd`'s process monitor uses: a single-process refresh
/// does not compute CPU usage correctly, so the whole system table is refreshed each read.
#[derive(Debug)]
pub struct SysinfoMetricsSource {
    system: System,
    pid: Pid,
}

impl SysinfoMetricsSource {
    /// Tracks the current process.
    #[must_use]
    pub fn current_process() -> Self {
        Self::for_pid(Pid::from_u32(std::process::id()))
    }

    /// Tracks an arbitrary process id (used for registered child processes).
    #[must_use]
    pub fn for_pid(pid: Pid) -> Self {
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl ProcessMetricsSource for SysinfoMetricsSource {
    fn read(&mut self) -> Result<RawReading, MetricsError> {
        self.system.refresh_all();
        self.system
            .process(self.pid)
            .map(|p| RawReading {
                cpu_percent: f64::from(p.cpu_usage()),
                memory_bytes: p.memory() as f64,
            })
            .ok_or(MetricsError::ProcessNotFound {
                pid: self.pid.as_u32(),
            })
    }
}

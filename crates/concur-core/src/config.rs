//! Tunable configuration, validated at construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// All tunables from the concurrency controller's configuration table, with their
/// documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Master switch. When `false`, the manager never adjusts parallelism.
    pub dynamic_concurrency_enabled: bool,
    /// Per-function parallelism ceiling.
    pub max_degree_of_parallelism: u32,
    /// Healthy polls required before growing.
    pub min_consecutive_increase_limit: u32,
    /// Unhealthy polls required before shrinking.
    pub min_consecutive_decrease_limit: u32,
    /// Per-function adjustment floor.
    pub min_adjustment_frequency: Duration,
    /// Post-decrease window during which increases are forbidden.
    pub failed_adjustment_quiet_window: Duration,
    /// Same-direction streak timeout; exceeding it resets the velocity run.
    pub adjustment_run_window: Duration,
    /// Provider re-poll cadence.
    pub throttle_check_interval: Duration,
    /// Ring capacity for CPU/memory sample histories.
    pub sample_history_size: usize,
    /// Process monitor tick cadence.
    pub sample_interval: Duration,
    /// Window size used when averaging recent samples for a health verdict.
    pub min_sample_count: usize,
    /// CPU overload fraction (aggregate CPU% / 100 at or above this is `Overloaded`).
    pub max_cpu_threshold: f64,
    /// Memory overload fraction of the computed byte budget.
    pub max_memory_threshold: f64,
    /// Starvation canary tick cadence.
    pub canary_interval: Duration,
    /// Missed-tick fraction at or above which the canary reports `Enabled`.
    pub canary_failure_threshold: f64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            dynamic_concurrency_enabled: false,
            max_degree_of_parallelism: 100,
            min_consecutive_increase_limit: 5,
            min_consecutive_decrease_limit: 3,
            min_adjustment_frequency: Duration::from_secs(5),
            failed_adjustment_quiet_window: Duration::from_secs(30),
            adjustment_run_window: Duration::from_secs(10),
            throttle_check_interval: Duration::from_secs(1),
            sample_history_size: 10,
            sample_interval: Duration::from_secs(1),
            min_sample_count: 5,
            max_cpu_threshold: 0.80,
            max_memory_threshold: 0.90,
            canary_interval: Duration::from_millis(100),
            canary_failure_threshold: 0.50,
        }
    }
}

impl ConcurrencyConfig {
    /// Validates the configuration, returning a [`ConfigError`] describing the first
    /// out-of-range field found.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.max_degree_of_parallelism < 1 {
            return Err(ConfigError::OutOfRange {
                field: "max_degree_of_parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.min_sample_count == 0 {
            return Err(ConfigError::OutOfRange {
                field: "min_sample_count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sample_history_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "sample_history_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sample_history_size < self.min_sample_count {
            return Err(ConfigError::OutOfRange {
                field: "sample_history_size",
                reason: "must be at least min_sample_count".to_string(),
            });
        }
        for (field, value) in [
            ("max_cpu_threshold", self.max_cpu_threshold),
            ("max_memory_threshold", self.max_memory_threshold),
            ("canary_failure_threshold", self.canary_failure_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    reason: "must be within [0.0, 1.0]".to_string(),
                });
            }
        }
        for (field, value) in [
            ("sample_interval", self.sample_interval),
            ("canary_interval", self.canary_interval),
            ("throttle_check_interval", self.throttle_check_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::OutOfRange {
                    field,
                    reason: "must be non-zero".to_string(),
                });
            }
        }
        Ok(self)
    }
}

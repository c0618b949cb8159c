//! Process sampling, host-health aggregation, and throttle providers for the dynamic
//! concurrency controller.
//!
//! Everything in this crate is an OS-touching implementation of the trait-based interfaces
//! `concur-core` defines: a [`metrics_source::ProcessMetricsSource`] backed by `sysinfo`, a
//! [`monitor::ProcessMonitor`] that samples it on a timer, a [`health_monitor::HostHealthMonitor`]
//! that aggregates host + child samples into a verdict, and the two throttle providers
//! (`providers::HostHealthThrottleProvider`, `providers::ThreadStarvationCanary`) that feed a
//! [`concur_core::ConcurrencyManager`].
//!
//! # Panic-free guarantee
//!
//! Sampling failures are caught at the monitor tick and logged, never propagated; provider
//! failures downgrade to [`concur_core::ThrottleState::Unknown`]. Nothing here panics on
//! valid input.

pub mod error;
pub mod health_monitor;
pub mod metrics_source;
pub mod monitor;
pub mod plan;
pub mod providers;

pub use error::MetricsError;
pub use health_monitor::HostHealthMonitor;
pub use metrics_source::{ProcessMetricsSource, RawReading, SysinfoMetricsSource};
pub use monitor::ProcessMonitor;
pub use plan::{PlanInfo, StaticPlanInfo};
pub use providers::{HostHealthThrottleProvider, ThreadStarvationCanary};

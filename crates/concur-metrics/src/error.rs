//! Error types for process sampling and host-health aggregation.

use thiserror::Error;

/// Errors a metrics source or monitor can surface to its *own* caller.
///
/// Per the controller's failure semantics, nothing here is allowed to propagate past a
/// monitor tick or a throttle provider: ticks swallow these and providers downgrade them to
/// [`concur_core::ThrottleState::Unknown`]. The type exists so the swallowing is explicit
/// (`match`ed and logged) rather than silent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    /// The process this monitor tracks is no longer visible to the OS (exited, or never
    /// existed on this host).
    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    /// The metrics source could not be refreshed.
    #[error("failed to refresh process metrics: {reason}")]
    RefreshFailed { reason: String },
}

//! Pure data model and adjustment policy for dynamic per-function concurrency control.
//!
//! This crate has no dependency on the host process or operating system: it knows how to
//! hold a parallelism cap per function, decide when to grow or shrink it, and combine
//! throttle signals from pluggable providers. Process sampling and the concrete throttle
//! providers that feed this policy live in the sibling `concur-metrics` crate.
//!
//! ```text
//! listener loop ──▶ ConcurrencyManager::get_status(function_id) ──▶ FunctionStatusSnapshot
//!                           │                     ▲
//!                           │                     │
//!                           ▼                     │
//!                  FunctionConcurrencyStatus   ThrottleProvider (dyn, pluggable)
//! ```
//!
//! # Panic-free guarantee
//!
//! Every public function in this crate returns a `Result` or a plain value; none of them
//! panic on valid input. [`config::ConcurrencyConfig::validate`] is the single place
//! invalid tunables are rejected, before a [`manager::ConcurrencyManager`] is ever built.

pub mod clock;
pub mod config;
pub mod error;
pub mod function_id;
pub mod health;
pub mod manager;
pub mod sample;
pub mod status;
pub mod throttle;

pub use clock::{Clock, SystemClock};
pub use config::ConcurrencyConfig;
pub use error::ConfigError;
pub use function_id::FunctionId;
pub use health::HealthVerdict;
pub use manager::ConcurrencyManager;
pub use sample::{ProcessStatsSnapshot, SampleRing};
pub use status::{FunctionConcurrencyStatus, FunctionStatusSnapshot};
pub use throttle::{ThrottleProvider, ThrottleState, ThrottleUnion};

#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;

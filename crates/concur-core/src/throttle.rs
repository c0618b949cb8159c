//! Throttle state and the pluggable provider extension point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single provider's load-shedding verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleState {
    /// Not enough data to judge; suppresses adjustments when seen in a combined set.
    Unknown,
    /// This provider wants load shed.
    Enabled,
    /// This provider sees no reason to shed load.
    Disabled,
}

impl ThrottleState {
    /// Combines a set of provider results: any `Enabled` makes throttling active; any
    /// `Unknown` in the set means "don't know, hold steady" and is reported back to the
    /// caller via [`ThrottleUnion`] so it can suppress adjustments even when another
    /// provider already says `Enabled`.
    pub fn combine(states: impl IntoIterator<Item = ThrottleState>) -> ThrottleUnion {
        let mut any_enabled = false;
        let mut any_unknown = false;
        for state in states {
            match state {
                ThrottleState::Enabled => any_enabled = true,
                ThrottleState::Unknown => any_unknown = true,
                ThrottleState::Disabled => {}
            }
        }
        ThrottleUnion {
            throttled: any_enabled,
            has_unknown: any_unknown,
        }
    }
}

/// Result of combining every provider's [`ThrottleState`] for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleUnion {
    /// At least one provider reported `Enabled`.
    pub throttled: bool,
    /// At least one provider reported `Unknown`; callers must hold steady regardless of
    /// `throttled`.
    pub has_unknown: bool,
}

/// A pluggable signal source the manager polls to decide whether to shed load.
///
/// Implementations must never panic; any internal failure should be reported as
/// [`ThrottleState::Unknown`] rather than propagated, since providers are consumed
/// uniformly and a single failing provider must not take down the others (§4.F
/// "Failure semantics").
pub trait ThrottleProvider: fmt::Debug + Send + Sync {
    /// A short, stable name used in logs.
    fn name(&self) -> &str;

    /// Computes the current throttle verdict for this provider.
    fn status(&self) -> ThrottleState;
}

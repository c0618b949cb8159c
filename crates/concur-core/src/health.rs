//! Health verdicts and the rule used to combine several of them.

use serde::{Deserialize, Serialize};

/// A health assessment for a single sub-metric (CPU, memory, ...) or for the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    /// Not enough data to judge.
    Unknown,
    /// Healthy.
    Ok,
    /// Under pressure.
    Overloaded,
}

impl HealthVerdict {
    /// Combines a set of sub-verdicts per the rule in the data model:
    /// `Unknown` iff every input is `Unknown`; `Overloaded` if any input is `Overloaded`;
    /// otherwise `Ok`.
    ///
    /// An empty iterator combines to `Unknown` (no contributing signal).
    pub fn combine(verdicts: impl IntoIterator<Item = HealthVerdict>) -> HealthVerdict {
        let mut any_known = false;
        let mut any_overloaded = false;
        for verdict in verdicts {
            match verdict {
                HealthVerdict::Unknown => {}
                HealthVerdict::Ok => any_known = true,
                HealthVerdict::Overloaded => {
                    any_known = true;
                    any_overloaded = true;
                }
            }
        }
        if !any_known {
            HealthVerdict::Unknown
        } else if any_overloaded {
            HealthVerdict::Overloaded
        } else {
            HealthVerdict::Ok
        }
    }
}

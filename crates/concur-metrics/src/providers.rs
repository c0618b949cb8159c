//! Component D: pluggable throttle signal sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use concur_core::clock::Clock;
use concur_core::health::HealthVerdict;
use concur_core::throttle::{ThrottleProvider, ThrottleState};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::health_monitor::HostHealthMonitor;

/// Translates [`HostHealthMonitor`] verdicts into throttle states: `Ok → Disabled`,
/// `Overloaded → Enabled`, `Unknown → Unknown`.
pub struct HostHealthThrottleProvider {
    health: Arc<HostHealthMonitor>,
}

impl HostHealthThrottleProvider {
    #[must_use]
    pub fn new(health: Arc<HostHealthMonitor>) -> Self {
        Self { health }
    }
}

impl std::fmt::Debug for HostHealthThrottleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHealthThrottleProvider").finish_non_exhaustive()
    }
}

impl ThrottleProvider for HostHealthThrottleProvider {
    fn name(&self) -> &str {
        "host-health"
    }

    fn status(&self) -> ThrottleState {
        match self.health.status() {
            HealthVerdict::Ok => ThrottleState::Disabled,
            HealthVerdict::Overloaded => ThrottleState::Enabled,
            HealthVerdict::Unknown => ThrottleState::Unknown,
        }
    }
}

struct CanaryState {
    last_check_at: std::time::Instant,
}

/// A self-timer that schedules a tick every `canary_interval` (default 100 ms) onto the
/// shared async executor and, on `status`, detects how many ticks were missed — a proxy for
/// thread-pool starvation: if the executor is too saturated to run a trivial periodic tick
/// on time, invocation work is starved too.
pub struct ThreadStarvationCanary {
    clock: Arc<dyn Clock>,
    canary_interval: Duration,
    failure_threshold: f64,
    tick_count: AtomicU64,
    state: Mutex<CanaryState>,
    cancel: CancellationToken,
}

impl ThreadStarvationCanary {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, canary_interval: Duration, failure_threshold: f64) -> Self {
        let now = clock.now();
        Self {
            clock,
            canary_interval,
            failure_threshold,
            tick_count: AtomicU64::new(0),
            state: Mutex::new(CanaryState { last_check_at: now }),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the periodic tick task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let canary = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut tick = interval(canary.canary_interval);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        canary.tick_count.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    /// Stops the background tick task. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// Records one observed tick. Exposed so tests (and a non-`start`-based caller) can
    /// drive the canary without a tokio runtime.
    pub fn record_tick(&self) {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ThreadStarvationCanary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadStarvationCanary")
            .field("canary_interval", &self.canary_interval)
            .field("failure_threshold", &self.failure_threshold)
            .finish_non_exhaustive()
    }
}

impl ThrottleProvider for ThreadStarvationCanary {
    fn name(&self) -> &str {
        "thread-starvation-canary"
    }

    fn status(&self) -> ThrottleState {
        let now = self.clock.now();
        let observed = self.tick_count.swap(0, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let elapsed_ms = now.duration_since(state.last_check_at).as_millis() as u64;
        state.last_check_at = now;
        drop(state);

        let expected = elapsed_ms / self.canary_interval.as_millis().max(1) as u64;
        if expected == 0 {
            return ThrottleState::Disabled;
        }
        let missed = expected.saturating_sub(observed);
        let missed_fraction = missed as f64 / expected as f64;
        if missed_fraction > self.failure_threshold {
            warn!(
                expected,
                observed, missed, "thread-starvation canary detected missed ticks"
            );
            ThrottleState::Enabled
        } else {
            ThrottleState::Disabled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concur_core::clock::ManualClock;

    #[test]
    fn no_elapsed_time_reports_disabled() {
        let clock = Arc::new(ManualClock::new());
        let canary = ThreadStarvationCanary::new(clock, Duration::from_millis(100), 0.5);
        assert_eq!(canary.status(), ThrottleState::Disabled);
    }

    #[test]
    fn all_ticks_observed_reports_disabled() {
        let clock = Arc::new(ManualClock::new());
        let canary = ThreadStarvationCanary::new(clock.clone(), Duration::from_millis(100), 0.5);
        for _ in 0..10 {
            canary.record_tick();
        }
        clock.advance(Duration::from_secs(1));
        assert_eq!(canary.status(), ThrottleState::Disabled);
    }

    #[test]
    fn exactly_half_missed_is_still_disabled_at_boundary() {
        let clock = Arc::new(ManualClock::new());
        let canary = ThreadStarvationCanary::new(clock.clone(), Duration::from_millis(100), 0.5);
        for _ in 0..5 {
            canary.record_tick();
        }
        clock.advance(Duration::from_secs(1));
        // expected=10, observed=5, missed=5, missed_fraction=0.5 -- not > 0.5
        assert_eq!(canary.status(), ThrottleState::Disabled);
    }

    #[test]
    fn more_than_half_missed_reports_enabled() {
        let clock = Arc::new(ManualClock::new());
        let canary = ThreadStarvationCanary::new(clock.clone(), Duration::from_millis(100), 0.5);
        for _ in 0..4 {
            canary.record_tick();
        }
        clock.advance(Duration::from_secs(1));
        // expected=10, observed=4, missed=6, missed_fraction=0.6 > 0.5
        assert_eq!(canary.status(), ThrottleState::Enabled);
    }

    #[test]
    fn health_provider_maps_verdicts() {
        let clock = Arc::new(ManualClock::new());
        let plan = crate::plan::StaticPlanInfo::unmetered();
        let health = Arc::new(HostHealthMonitor::new(
            clock,
            &plan,
            4,
            10,
            crate::health_monitor::MIN_SAMPLE_COUNT,
            0.80,
            0.90,
        ));
        let provider = HostHealthThrottleProvider::new(health);
        // No samples yet on a fresh monitor -> CPU sub-verdict Unknown, memory disabled by
        // plan -> both Unknown -> combine is Unknown.
        assert_eq!(provider.status(), ThrottleState::Unknown);
    }
}

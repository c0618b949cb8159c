//! Per-function concurrency status: the adjustment state machine and invocation accounting
//! described in §4.E.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Direction of a parallelism adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// No adjustment has happened yet.
    None,
    Up,
    Down,
}

/// Bookkeeping touched only while computing an adjustment: never read or written
/// concurrently by invocation callbacks, but guarded anyway so `FunctionConcurrencyStatus`
/// stays `Sync` under misuse (§7 "Misuse").
#[derive(Debug)]
struct AdjustmentState {
    last_adjustment_at: Instant,
    last_failed_adjustment_at: Option<Instant>,
    run_direction: Direction,
    run_count: u32,
}

/// A read-only view of a function's concurrency status, as returned by
/// `ConcurrencyManager::get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionStatusSnapshot {
    pub current_parallelism: u32,
    pub outstanding_invocations: u32,
    pub fetch_count: u32,
}

/// Holds the current parallelism cap, outstanding-invocation count, and adjustment history
/// for a single function.
///
/// `current_parallelism` and `outstanding_invocations` are atomics so `fetch_count` can be
/// read lock-free from listener threads while `get_status` is serialized (by contract) for
/// this same function id. The adjustment bookkeeping lives behind a `Mutex` since it is only
/// ever touched from within `get_status`.
pub struct FunctionConcurrencyStatus {
    clock: Arc<dyn Clock>,
    max_degree_of_parallelism: u32,
    current_parallelism: AtomicU32,
    outstanding_invocations: AtomicU32,
    max_concurrent_since_last_adjustment: AtomicU32,
    adjustment: Mutex<AdjustmentState>,
}

impl FunctionConcurrencyStatus {
    /// Creates a new status starting at parallelism 1, with zero outstanding invocations.
    pub fn new(clock: Arc<dyn Clock>, max_degree_of_parallelism: u32) -> Self {
        let now = clock.now();
        Self {
            clock,
            max_degree_of_parallelism,
            current_parallelism: AtomicU32::new(1),
            outstanding_invocations: AtomicU32::new(0),
            max_concurrent_since_last_adjustment: AtomicU32::new(0),
            adjustment: Mutex::new(AdjustmentState {
                last_adjustment_at: now,
                last_failed_adjustment_at: None,
                run_direction: Direction::None,
                run_count: 0,
            }),
        }
    }

    /// The current parallelism cap.
    #[must_use]
    pub fn current_parallelism(&self) -> u32 {
        self.current_parallelism.load(Ordering::SeqCst)
    }

    /// The current outstanding invocation count.
    #[must_use]
    pub fn outstanding_invocations(&self) -> u32 {
        self.outstanding_invocations.load(Ordering::SeqCst)
    }

    /// How many additional invocations may be fetched right now.
    ///
    /// Returns `0` whenever `throttled` is true, or whenever `outstanding` has (transiently)
    /// exceeded `current_parallelism`; otherwise `current_parallelism - outstanding`.
    #[must_use]
    pub fn fetch_count(&self, throttled: bool) -> u32 {
        if throttled {
            return 0;
        }
        let current = self.current_parallelism();
        let outstanding = self.outstanding_invocations();
        current.saturating_sub(outstanding)
    }

    /// Returns a read-only snapshot of this status.
    #[must_use]
    pub fn snapshot(&self, throttled: bool) -> FunctionStatusSnapshot {
        FunctionStatusSnapshot {
            current_parallelism: self.current_parallelism(),
            outstanding_invocations: self.outstanding_invocations(),
            fetch_count: self.fetch_count(throttled),
        }
    }

    /// Records the start of an invocation: increments `outstanding_invocations` and raises
    /// the high-water mark if needed.
    pub fn function_started(&self) {
        let outstanding = self.outstanding_invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_since_last_adjustment
            .fetch_max(outstanding, Ordering::SeqCst);
    }

    /// Records the completion of an invocation: decrements `outstanding_invocations`,
    /// saturating at zero (defensive against over-completion under misuse; invariant 2
    /// in §3 must never be violated).
    pub fn function_completed(&self) {
        let _ = self
            .outstanding_invocations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(1))
            });
    }

    /// `true` once more than `min_adjustment_frequency` has elapsed since the last
    /// adjustment (the anti-thrash floor).
    #[must_use]
    pub fn can_adjust(&self, min_adjustment_frequency: Duration) -> bool {
        let state = self.lock_adjustment();
        self.clock.now().duration_since(state.last_adjustment_at) > min_adjustment_frequency
    }

    /// `true` if parallelism has room to shrink.
    #[must_use]
    pub fn can_decrease(&self) -> bool {
        self.current_parallelism() > 1
    }

    /// `true` if parallelism may grow, given the manager's configured ceiling and quiet
    /// window. As a side effect, clears `last_failed_adjustment_at` once the quiet window
    /// has elapsed, per §4.E.
    pub fn can_increase(&self, limit: u32, quiet_window: Duration) -> bool {
        let now = self.clock.now();
        let mut state = self.lock_adjustment();
        if let Some(failed_at) = state.last_failed_adjustment_at {
            if now.duration_since(failed_at) <= quiet_window {
                return false;
            }
            state.last_failed_adjustment_at = None;
        }
        drop(state);

        if self.max_concurrent_since_last_adjustment.load(Ordering::SeqCst) < self.current_parallelism() {
            return false;
        }
        self.current_parallelism() < limit
    }

    /// Grows parallelism by the velocity-shaped delta, clamped at `max_degree_of_parallelism`.
    /// Returns the parallelism actually applied after clamping.
    pub fn increase(&self, run_window: Duration) -> u32 {
        let delta = self.record_adjustment(Direction::Up, run_window, false);
        self.apply_delta(delta as i64)
    }

    /// Shrinks parallelism by the velocity-shaped delta, clamped at 1, and records the
    /// failure timestamp that gates future increases. Returns the parallelism actually
    /// applied after clamping.
    pub fn decrease(&self, run_window: Duration) -> u32 {
        let delta = self.record_adjustment(Direction::Down, run_window, true);
        self.apply_delta(-(delta as i64))
    }

    /// Core velocity rule (§4.E): updates the run-direction/run-count bookkeeping and
    /// returns the delta magnitude for this adjustment. Resets the high-water mark and
    /// bumps `last_adjustment_at` unconditionally, as every adjustment must (§3 invariant 5).
    ///
    /// Per §9: the first adjustment in a new direction moves by 1, the second by 2, and so
    /// on up to the cap of 6. A direction change (or a run-window timeout) only resets the
    /// counter this call reads *before* incrementing it -- it does not suppress the
    /// increment, so the very next same-direction call already sees a counter of 1.
    fn record_adjustment(&self, direction: Direction, run_window: Duration, is_decrease: bool) -> u32 {
        let now = self.clock.now();
        let mut state = self.lock_adjustment();

        let reset = state.run_direction != direction
            || now.duration_since(state.last_adjustment_at) > run_window;

        let run_count_before_increment = if reset { 0 } else { state.run_count };
        let delta = 1 + run_count_before_increment.min(5);

        state.run_count = run_count_before_increment + 1;
        state.run_direction = direction;
        state.last_adjustment_at = now;
        if is_decrease {
            state.last_failed_adjustment_at = Some(now);
        }
        drop(state);

        self.max_concurrent_since_last_adjustment
            .store(0, Ordering::SeqCst);

        delta
    }

    /// Applies a signed delta to `current_parallelism`, clamped to `[1, max]`, and returns
    /// the resulting value.
    fn apply_delta(&self, delta: i64) -> u32 {
        let max = self.max_degree_of_parallelism;
        let mut result = 0;
        let _ = self
            .current_parallelism
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = (i64::from(current) + delta).clamp(1, i64::from(max)) as u32;
                result = next;
                Some(next)
            });
        result
    }

    fn lock_adjustment(&self) -> std::sync::MutexGuard<'_, AdjustmentState> {
        self.adjustment
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FunctionConcurrencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionConcurrencyStatus")
            .field("current_parallelism", &self.current_parallelism())
            .field("outstanding_invocations", &self.outstanding_invocations())
            .field(
                "max_concurrent_since_last_adjustment",
                &self.max_concurrent_since_last_adjustment.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

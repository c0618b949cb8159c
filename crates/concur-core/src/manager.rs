//! The concurrency manager (§4.F): owns the throttle providers and the per-function status
//! map, and is the single entry point listener loops call into.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::debug;

use crate::clock::Clock;
use crate::config::ConcurrencyConfig;
use crate::function_id::FunctionId;
use crate::status::{FunctionConcurrencyStatus, FunctionStatusSnapshot};
use crate::throttle::{ThrottleProvider, ThrottleState};

/// Cached result of the last `update_throttle_state` poll, plus the hysteresis counters
/// it drives.
struct ThrottleCache {
    last_check: Instant,
    throttled: bool,
    has_unknown: bool,
    consecutive_healthy_count: u32,
    consecutive_unhealthy_count: u32,
    last_results: Vec<ThrottleState>,
}

/// Owns the throttle providers and the per-function concurrency state, and answers
/// "how much work may this function fetch right now?" for many concurrently-running
/// listener loops.
///
/// Callers must not invoke [`Self::get_status`] concurrently for the *same* function id
/// (§5 "Ordering guarantees"); different function ids may call concurrently.
pub struct ConcurrencyManager {
    config: ConcurrencyConfig,
    clock: Arc<dyn Clock>,
    providers: Vec<Arc<dyn ThrottleProvider>>,
    statuses: RwLock<HashMap<FunctionId, Arc<FunctionConcurrencyStatus>>>,
    throttle_cache: Mutex<ThrottleCache>,
}

impl ConcurrencyManager {
    /// Creates a new manager. `config` should already have been validated via
    /// [`ConcurrencyConfig::validate`].
    pub fn new(
        config: ConcurrencyConfig,
        clock: Arc<dyn Clock>,
        providers: Vec<Arc<dyn ThrottleProvider>>,
    ) -> Self {
        let now = clock.now();
        Self {
            config,
            clock,
            providers,
            statuses: RwLock::new(HashMap::new()),
            throttle_cache: Mutex::new(ThrottleCache {
                last_check: now,
                throttled: false,
                has_unknown: true,
                consecutive_healthy_count: 0,
                consecutive_unhealthy_count: 0,
                last_results: Vec::new(),
            }),
        }
    }

    /// The `dynamic_concurrency_enabled` master switch from configuration.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.dynamic_concurrency_enabled
    }

    /// Read-only access to the manager's configuration.
    #[must_use]
    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    /// Re-polls every throttle provider if more than `throttle_check_interval` has passed
    /// since the last poll, then returns the (possibly cached) combined throttle flag.
    pub fn is_throttle_enabled(&self) -> bool {
        let now = self.clock.now();
        let needs_refresh = {
            let cache = self.lock_cache();
            now.duration_since(cache.last_check) > self.config.throttle_check_interval
        };
        if needs_refresh {
            self.update_throttle_state(now);
        }
        self.lock_cache().throttled
    }

    /// Polls every provider once, updates the combined throttle flag and the two
    /// hysteresis counters (§4.F "Throttle refresh").
    fn update_throttle_state(&self, now: Instant) {
        let results: Vec<ThrottleState> = self.providers.iter().map(|p| p.status()).collect();
        let union = ThrottleState::combine(results.iter().copied());

        let mut cache = self.lock_cache();
        if union.throttled {
            cache.consecutive_unhealthy_count += 1;
            cache.consecutive_healthy_count = 0;
        } else {
            cache.consecutive_healthy_count += 1;
            cache.consecutive_unhealthy_count = 0;
        }
        cache.throttled = union.throttled;
        cache.has_unknown = union.has_unknown;
        cache.last_check = now;
        cache.last_results = results;
    }

    /// Looks up (or creates) the status, advances its parallelism per policy, and returns a
    /// snapshot. See §4.F for the exact step ordering.
    pub fn get_status(&self, function_id: impl Into<FunctionId>) -> FunctionStatusSnapshot {
        let function_id = function_id.into();
        let status = self.get_or_create(&function_id);

        if !self.enabled() {
            return status.snapshot(false);
        }

        if !status.can_adjust(self.config.min_adjustment_frequency) {
            let throttled = self.lock_cache().throttled;
            return status.snapshot(throttled);
        }

        let throttled = self.is_throttle_enabled();
        let has_unknown = self.lock_cache().has_unknown;
        if has_unknown {
            return status.snapshot(throttled);
        }

        if !throttled && self.can_increase_policy(&status) {
            let new_parallelism = status.increase(self.config.adjustment_run_window);
            debug!(
                function_id = %function_id,
                parallelism = new_parallelism,
                outstanding = status.outstanding_invocations(),
                direction = "up",
                "adjusted parallelism"
            );
        } else if throttled && self.can_decrease_policy(&status) {
            let new_parallelism = status.decrease(self.config.adjustment_run_window);
            debug!(
                function_id = %function_id,
                parallelism = new_parallelism,
                outstanding = status.outstanding_invocations(),
                direction = "down",
                "adjusted parallelism"
            );
        }

        status.snapshot(throttled)
    }

    /// Forwards to the function's status: records an invocation start.
    pub fn function_started(&self, function_id: impl Into<FunctionId>) {
        self.get_or_create(&function_id.into()).function_started();
    }

    /// Forwards to the function's status: records an invocation completion.
    pub fn function_completed(&self, function_id: impl Into<FunctionId>) {
        self.get_or_create(&function_id.into()).function_completed();
    }

    fn can_increase_policy(&self, status: &FunctionConcurrencyStatus) -> bool {
        let healthy_enough = {
            let cache = self.lock_cache();
            cache.consecutive_healthy_count >= self.config.min_consecutive_increase_limit
        };
        healthy_enough
            && status.can_increase(
                self.config.max_degree_of_parallelism,
                self.config.failed_adjustment_quiet_window,
            )
    }

    fn can_decrease_policy(&self, status: &FunctionConcurrencyStatus) -> bool {
        let unhealthy_enough = {
            let cache = self.lock_cache();
            cache.consecutive_unhealthy_count >= self.config.min_consecutive_decrease_limit
        };
        unhealthy_enough && status.can_decrease()
    }

    fn get_or_create(&self, function_id: &FunctionId) -> Arc<FunctionConcurrencyStatus> {
        if let Some(status) = self.lock_statuses_read().get(function_id) {
            return status.clone();
        }
        self.lock_statuses_write()
            .entry(function_id.clone())
            .or_insert_with(|| {
                Arc::new(FunctionConcurrencyStatus::new(
                    self.clock.clone(),
                    self.config.max_degree_of_parallelism,
                ))
            })
            .clone()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ThrottleCache> {
        self.throttle_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_statuses_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<FunctionId, Arc<FunctionConcurrencyStatus>>> {
        self.statuses
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_statuses_write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<FunctionId, Arc<FunctionConcurrencyStatus>>> {
        self.statuses
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

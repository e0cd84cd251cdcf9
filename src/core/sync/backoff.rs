/*!
 * Adaptive Steal Backoff
 *
 * Per-thread statistics drive the delay between steal probes: the delay grows
 * with recent failures, doubles when no steal has succeeded recently, and is
 * capped. Past the failure thresholds the thread yields its slice instead of
 * spinning. Success decays the failure count aggressively; failure resets the
 * success streak.
 */

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Tunable backoff thresholds. Defaults match the values the scheduler was
/// profiled with; expose them rather than bake them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackoffConfig {
    /// Failures past this always yield
    pub high_failure_threshold: u32,
    /// Failures past this yield when no success streak is running
    pub medium_failure_threshold: u32,
    /// Cap on the failure-derived pause count
    pub max_base_delay: u32,
    /// Absolute cap on the pause count after staleness scaling
    pub max_total_delay: u32,
    /// A success older than this doubles the delay
    pub stale_success_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            high_failure_threshold: 10,
            medium_failure_threshold: 5,
            max_base_delay: 64,
            max_total_delay: 256,
            stale_success_ms: 10,
        }
    }
}

struct StealStats {
    failures: Cell<u32>,
    streak: Cell<u32>,
    last_success: Cell<Instant>,
}

thread_local! {
    static STEAL_STATS: StealStats = StealStats {
        failures: Cell::new(0),
        streak: Cell::new(0),
        last_success: Cell::new(Instant::now()),
    };
}

/// Record a successful queue pop. Decays the failure count by two.
#[inline]
pub(crate) fn record_success() {
    STEAL_STATS.with(|stats| {
        stats.streak.set(stats.streak.get() + 1);
        stats.failures.set(stats.failures.get().saturating_sub(2));
        stats.last_success.set(Instant::now());
    });
}

#[inline]
pub(crate) fn record_failure() {
    STEAL_STATS.with(|stats| {
        stats.failures.set(stats.failures.get() + 1);
        stats.streak.set(0);
    });
}

fn adaptive_delay(config: &BackoffConfig) -> u32 {
    STEAL_STATS.with(|stats| {
        let mut delay = (stats.failures.get() * 2).min(config.max_base_delay);
        let since_success = stats.last_success.get().elapsed();
        if since_success > Duration::from_millis(config.stale_success_ms) {
            delay *= 2;
        }
        delay.min(config.max_total_delay)
    })
}

fn should_yield(config: &BackoffConfig) -> bool {
    STEAL_STATS.with(|stats| {
        let failures = stats.failures.get();
        failures > config.high_failure_threshold
            || (failures > config.medium_failure_threshold && stats.streak.get() == 0)
    })
}

/// Execute `count` CPU pause hints.
#[inline]
pub(crate) fn relax(count: u32) {
    for _ in 0..count {
        std::hint::spin_loop();
    }
}

/// Back off after an unproductive steal probe, then record the failure.
pub(crate) fn on_steal_miss(config: &BackoffConfig) {
    if should_yield(config) {
        std::thread::yield_now();
    } else {
        relax(adaptive_delay(config));
    }
    record_failure();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_raise_delay_until_capped() {
        let config = BackoffConfig::default();
        for _ in 0..200 {
            record_failure();
        }
        assert!(adaptive_delay(&config) <= config.max_total_delay);
        assert!(should_yield(&config));
    }

    #[test]
    fn test_success_decays_failures() {
        let config = BackoffConfig::default();
        for _ in 0..8 {
            record_failure();
        }
        for _ in 0..8 {
            record_success();
        }
        assert!(!should_yield(&config));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = BackoffConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: BackoffConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}

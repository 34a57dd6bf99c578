//! Per-device circuit breaker
//!
//! Counts consecutive connect failures; at the threshold the circuit opens
//! and all reconnect attempts are suppressed for the cool-down period. Once
//! the cool-down elapses the counter resets and exactly one fresh attempt is
//! allowed through.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::CircuitConfig;
use crate::device::DeviceId;

/// Failure bookkeeping for one device
#[derive(Debug, Clone, Copy, Default)]
struct FailureRecord {
    consecutive_failures: u32,
    circuit_open_until: Option<Instant>,
}

/// Circuit breaker shared across the connection machinery
#[derive(Debug)]
pub struct CircuitBreaker {
    records: DashMap<DeviceId, FailureRecord>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitConfig) -> Self {
        Self {
            records: DashMap::new(),
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }

    /// Record a connect failure; opens the circuit at the threshold
    pub fn on_failure(&self, device_id: DeviceId) -> u32 {
        let mut record = self.records.entry(device_id).or_default();
        record.consecutive_failures += 1;
        if record.consecutive_failures >= self.failure_threshold && record.circuit_open_until.is_none()
        {
            record.circuit_open_until = Some(Instant::now() + self.cooldown);
            warn!(
                device_id,
                failures = record.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened"
            );
        }
        record.consecutive_failures
    }

    /// Record a successful connect; fully resets the device's record
    pub fn on_success(&self, device_id: DeviceId) {
        if let Some(mut record) = self.records.get_mut(&device_id) {
            if record.consecutive_failures > 0 {
                info!(device_id, "Circuit reset after successful connect");
            }
            *record = FailureRecord::default();
        }
    }

    /// Whether connect attempts for the device are currently suppressed
    ///
    /// An elapsed cool-down resets the failure counter as a side effect, so
    /// the next failure streak starts from zero.
    pub fn is_open(&self, device_id: DeviceId) -> bool {
        let Some(mut record) = self.records.get_mut(&device_id) else {
            return false;
        };
        match record.circuit_open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *record = FailureRecord::default();
                info!(device_id, "Circuit cool-down elapsed, closing");
                false
            }
            None => false,
        }
    }

    /// Time left on the cool-down, `None` when the circuit is not open
    pub fn remaining_cooldown(&self, device_id: DeviceId) -> Option<Duration> {
        let record = self.records.get(&device_id)?;
        let until = record.circuit_open_until?;
        until.checked_duration_since(Instant::now())
    }

    /// Current consecutive failure count (0 if never failed)
    pub fn failure_count(&self, device_id: DeviceId) -> u32 {
        self.records
            .get(&device_id)
            .map(|r| r.consecutive_failures)
            .unwrap_or(0)
    }

    /// Forget the device entirely (administrative removal)
    pub fn clear(&self, device_id: DeviceId) {
        self.records.remove(&device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(&CircuitConfig {
            failure_threshold: threshold,
            cooldown_secs,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(5, 300);
        for _ in 0..4 {
            breaker.on_failure(1);
            assert!(!breaker.is_open(1));
        }
        breaker.on_failure(1);
        assert!(breaker.is_open(1));
    }

    #[test]
    fn test_success_resets_counter() {
        let breaker = breaker(5, 300);
        for _ in 0..4 {
            breaker.on_failure(1);
        }
        breaker.on_success(1);
        assert_eq!(breaker.failure_count(1), 0);
        breaker.on_failure(1);
        assert!(!breaker.is_open(1));
    }

    #[test]
    fn test_cooldown_elapse_resets() {
        // Zero cool-down: opens and immediately closes again on the next check
        let breaker = breaker(2, 0);
        breaker.on_failure(1);
        breaker.on_failure(1);
        assert!(!breaker.is_open(1));
        assert_eq!(breaker.failure_count(1), 0);
    }

    #[test]
    fn test_remaining_cooldown_tracks_open_circuit() {
        let breaker = breaker(1, 300);
        assert_eq!(breaker.remaining_cooldown(1), None);

        breaker.on_failure(1);
        let left = breaker.remaining_cooldown(1).expect("circuit open");
        assert!(left <= Duration::from_secs(300));
        assert!(left > Duration::from_secs(290));

        breaker.on_success(1);
        assert_eq!(breaker.remaining_cooldown(1), None);
    }

    #[test]
    fn test_devices_are_independent() {
        let breaker = breaker(2, 300);
        breaker.on_failure(1);
        breaker.on_failure(1);
        assert!(breaker.is_open(1));
        assert!(!breaker.is_open(2));
    }

    #[test]
    fn test_clear_forgets_device() {
        let breaker = breaker(1, 300);
        breaker.on_failure(1);
        assert!(breaker.is_open(1));
        breaker.clear(1);
        assert!(!breaker.is_open(1));
    }
}

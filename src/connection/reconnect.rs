//! Reconnect scheduling
//!
//! Exponential backoff with jitter, one armed timer per device at a time.
//! Scheduling always cancels the previous timer for the device
//! (cancel-and-replace), and is skipped entirely while the circuit is open or
//! the device is already connecting/connected.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::actor::DeviceCommand;
use super::circuit::CircuitBreaker;
use super::state::{ConnState, DeviceStatus};
use crate::config::ReconnectConfig;
use crate::device::DeviceId;

/// Exponential backoff policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl BackoffPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Delay before attempt `failure_count + 1`:
    /// `min(max_delay, base * 2^failures)` with a ±jitter fraction applied
    pub fn delay(&self, failure_count: u32) -> Duration {
        let exponent = failure_count.min(16) as i32;
        let mut delay = self.base_delay.mul_f64(2f64.powi(exponent));
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            delay = delay.mul_f64(1.0 + factor);
        }
        delay
    }
}

/// Owns the per-device retry timers
pub struct ReconnectScheduler {
    policy: BackoffPolicy,
    breaker: Arc<CircuitBreaker>,
    statuses: Arc<DashMap<DeviceId, DeviceStatus>>,
    timers: DashMap<DeviceId, JoinHandle<()>>,
}

impl ReconnectScheduler {
    pub fn new(
        policy: BackoffPolicy,
        breaker: Arc<CircuitBreaker>,
        statuses: Arc<DashMap<DeviceId, DeviceStatus>>,
    ) -> Self {
        Self {
            policy,
            breaker,
            statuses,
            timers: DashMap::new(),
        }
    }

    /// Arm (or re-arm) the reconnect timer for a device
    ///
    /// The timer fires a `Connect` command into the device's actor. Returns
    /// the armed delay, or `None` when scheduling was skipped.
    pub fn schedule(
        &self,
        device_id: DeviceId,
        failure_count: u32,
        tx: mpsc::Sender<DeviceCommand>,
    ) -> Option<Duration> {
        if self.breaker.is_open(device_id) {
            debug!(device_id, "Reconnect suppressed: circuit open");
            return None;
        }
        if let Some(status) = self.statuses.get(&device_id) {
            if status.state.connect_is_noop() {
                debug!(device_id, state = %status.state, "Reconnect skipped: already live");
                return None;
            }
        }

        // Cancel-and-replace: never two timers for one device
        self.cancel(device_id);

        let delay = self.policy.delay(failure_count);
        info!(device_id, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Actor gone means the device was removed; nothing to do
            let _ = tx.send(DeviceCommand::Connect).await;
        });
        self.timers.insert(device_id, handle);
        Some(delay)
    }

    /// Cancel any armed timer for the device
    pub fn cancel(&self, device_id: DeviceId) {
        if let Some((_, handle)) = self.timers.remove(&device_id) {
            handle.abort();
        }
    }

    /// Number of currently armed timers
    pub fn armed(&self) -> usize {
        self.timers.retain(|_, handle| !handle.is_finished());
        self.timers.len()
    }
}

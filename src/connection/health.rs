//! Connection health monitor
//!
//! Periodic sweep over the status map. A connected device with no socket
//! activity inside the inactivity window is assumed half-open and torn down
//! through the normal reconnect path. Devices stranded in `Failed` after a
//! circuit cool-down get a fresh connect nudge, since no timer is armed for
//! them anymore.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::actor::DeviceCommand;
use super::state::ConnState;
use crate::config::HealthConfig;
use crate::connection::registry::ConnectionRegistry;

pub fn start_health_monitor(
    registry: Arc<ConnectionRegistry>,
    config: HealthConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let sweep_interval = config.sweep_interval();
    let max_inactive = config.max_inactive();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            sweep_secs = sweep_interval.as_secs(),
            max_inactive_secs = max_inactive.as_secs(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => sweep(&registry, max_inactive).await,
                _ = shutdown.cancelled() => {
                    info!("Health monitor stopping");
                    break;
                }
            }
        }
    })
}

async fn sweep(registry: &ConnectionRegistry, max_inactive: std::time::Duration) {
    let statuses = registry.statuses();
    let snapshot: Vec<(crate::device::DeviceId, ConnState, std::time::Duration)> = statuses
        .iter()
        .map(|e| (*e.key(), e.state, e.last_activity.elapsed()))
        .collect();

    let mut stale = 0usize;
    for (device_id, state, idle) in snapshot {
        match state {
            ConnState::Connected if idle > max_inactive => {
                stale += 1;
                warn!(
                    device_id,
                    idle_secs = idle.as_secs(),
                    "Stale connection, forcing reconnect"
                );
                if let Ok(tx) = registry.handle(device_id) {
                    let _ = tx
                        .send(DeviceCommand::ForceReconnect {
                            reason: format!("no activity for {}s", idle.as_secs()),
                        })
                        .await;
                }
            }
            // No timer armed in these states; re-attempt once per sweep. The
            // actor itself rejects the connect while the circuit is open.
            ConnState::Failed | ConnState::Disconnected => {
                if let Ok(tx) = registry.handle(device_id) {
                    let _ = tx.send(DeviceCommand::Connect).await;
                }
            }
            _ => {}
        }
    }
    debug!(stale, "Health sweep complete");
}

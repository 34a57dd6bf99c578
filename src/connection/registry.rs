//! Connection registry
//!
//! Owns one actor per configured device and the shared status map. The
//! registry is the only component allowed to spawn or remove actors, so
//! "at most one actor (and therefore one socket) per device" holds by
//! construction.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actor::{ActorContext, DeviceActor, DeviceCommand};
use super::state::DeviceStatus;
use crate::device::{Device, DeviceId, DeviceTable};
use crate::error::{FieldError, Result};

struct ActorHandle {
    tx: mpsc::Sender<DeviceCommand>,
    join: JoinHandle<()>,
}

pub struct ConnectionRegistry {
    devices: Arc<DeviceTable>,
    ctx: Arc<ActorContext>,
    actors: DashMap<DeviceId, ActorHandle>,
}

impl ConnectionRegistry {
    pub fn new(devices: Arc<DeviceTable>, ctx: Arc<ActorContext>) -> Self {
        Self {
            devices,
            ctx,
            actors: DashMap::new(),
        }
    }

    pub fn statuses(&self) -> Arc<DashMap<DeviceId, DeviceStatus>> {
        Arc::clone(&self.ctx.statuses)
    }

    pub fn status(&self, device_id: DeviceId) -> Option<DeviceStatus> {
        self.ctx.statuses.get(&device_id).map(|s| *s)
    }

    pub fn device(&self, device_id: DeviceId) -> Result<Arc<Device>> {
        self.devices.get(device_id)
    }

    /// Command channel for a device, spawning its actor on first use
    pub fn handle(&self, device_id: DeviceId) -> Result<mpsc::Sender<DeviceCommand>> {
        if let Some(existing) = self.actors.get(&device_id) {
            return Ok(existing.tx.clone());
        }
        let device = self.devices.get(device_id)?;
        // Entry API closes the race between two concurrent first uses
        let entry = self.actors.entry(device_id).or_insert_with(|| {
            let (tx, join) = DeviceActor::spawn(device, Arc::clone(&self.ctx));
            ActorHandle { tx, join }
        });
        Ok(entry.tx.clone())
    }

    /// Spawn all configured actors and fire an initial connect for each
    pub async fn connect_all(&self) -> Result<()> {
        for device in self.devices.iter() {
            let tx = self.handle(device.id)?;
            if tx.send(DeviceCommand::Connect).await.is_err() {
                warn!(device_id = device.id, "Actor rejected initial connect");
            }
        }
        info!(devices = self.devices.len(), "Initial connect dispatched");
        Ok(())
    }

    /// Administrative removal: terminate the actor, drop timers and breaker
    /// state (the actor's teardown clears both), and forget the status entry
    pub async fn remove(&self, device_id: DeviceId) -> Result<()> {
        let Some((_, handle)) = self.actors.remove(&device_id) else {
            return Err(FieldError::DeviceUnknown(device_id));
        };
        let _ = handle.tx.send(DeviceCommand::Remove).await;
        if handle.join.await.is_err() {
            warn!(device_id, "Device actor panicked during removal");
        }
        info!(device_id, "Device removed");
        Ok(())
    }

    /// Graceful shutdown: terminate every actor and wait for them
    pub async fn shutdown(&self) {
        let ids: Vec<DeviceId> = self.actors.iter().map(|e| *e.key()).collect();
        let removals = ids.into_iter().map(|id| self.remove(id));
        for result in join_all(removals).await {
            if let Err(e) = result {
                warn!(error = %e, "Shutdown removal failed");
            }
        }
        info!("Connection registry shut down");
    }
}

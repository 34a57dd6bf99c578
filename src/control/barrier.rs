//! Barrier and curtain actuation
//!
//! Drives the barrier control register. `run` is a pulse: the run bit is
//! written, then cleared automatically after the configured pulse duration.
//! `stop` toggles the stop bit against the register's current contents, so
//! two operators stopping at the same moment can cancel each other out; the
//! panels tolerate this and the control room treats stop as retryable.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::codec::modbus::{BARRIER_BIT_RELEASE, BARRIER_BIT_RUN, BARRIER_BIT_STOP};
use crate::device::Device;
use crate::dispatch::MessageDispatcher;
use crate::error::{FieldError, Result};

pub struct BarrierController {
    dispatcher: Arc<MessageDispatcher>,
    pulse: Duration,
}

impl BarrierController {
    pub fn new(dispatcher: Arc<MessageDispatcher>, pulse: Duration) -> Self {
        Self { dispatcher, pulse }
    }

    fn control_register(device: &Device) -> Result<u16> {
        device.barrier_register.ok_or_else(|| {
            FieldError::config(format!("Device {} has no barrier register", device.id))
        })
    }

    /// Lower the barrier (run bit pulse with automatic clear)
    pub async fn run(&self, device: &Arc<Device>) -> Result<()> {
        let register = Self::control_register(device)?;
        self.dispatcher
            .write_registers(device, register, &[BARRIER_BIT_RUN])
            .await?;
        info!(device_id = device.id, "Barrier run pulse started");

        let dispatcher = Arc::clone(&self.dispatcher);
        let device = Arc::clone(device);
        let pulse = self.pulse;
        tokio::spawn(async move {
            tokio::time::sleep(pulse).await;
            match dispatcher.write_registers(&device, register, &[0]).await {
                Ok(()) => info!(device_id = device.id, "Barrier run pulse cleared"),
                Err(e) => warn!(
                    device_id = device.id,
                    error = %e,
                    "Barrier pulse clear failed, register left asserted"
                ),
            }
        });
        Ok(())
    }

    /// Toggle the stop bit against the register's current contents
    pub async fn stop(&self, device: &Arc<Device>) -> Result<()> {
        let register = Self::control_register(device)?;
        let current = self
            .dispatcher
            .read_holding(device, register, 1)
            .await?
            .first()
            .copied()
            .unwrap_or(0);
        let next = current ^ BARRIER_BIT_STOP;
        self.dispatcher
            .write_registers(device, register, &[next])
            .await?;
        info!(device_id = device.id, current, next, "Barrier stop toggled");
        Ok(())
    }

    /// Raise the barrier
    pub async fn release(&self, device: &Arc<Device>) -> Result<()> {
        let register = Self::control_register(device)?;
        self.dispatcher
            .write_registers(device, register, &[BARRIER_BIT_RELEASE])
            .await?;
        info!(device_id = device.id, "Barrier released");
        Ok(())
    }
}

//! Message dispatch
//!
//! The one entry point other components use to talk to devices. Encodes at
//! this layer, then hands bytes to the device's actor; per-device ordering is
//! inherited from the actor's channel. Broadcast fans out concurrently and
//! isolates per-device failures.

use futures::future::join_all;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::codec::modbus;
use crate::codec::{encode_billboard, BillboardCommand};
use crate::connection::{ConnectionRegistry, DeviceCommand};
use crate::device::{Device, DeviceId};
use crate::error::{FieldError, Result};

/// Result of a billboard broadcast
#[derive(Debug, Default)]
pub struct BroadcastOutcome {
    pub succeeded: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, FieldError)>,
}

impl BroadcastOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MessageDispatcher {
    registry: Arc<ConnectionRegistry>,
    transaction_id: AtomicU16,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            transaction_id: AtomicU16::new(1),
        }
    }

    fn next_transaction_id(&self) -> u16 {
        // Wraps; 0 is as good a transaction id as any
        self.transaction_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a pre-encoded frame to a device (connects first if needed)
    pub async fn send_raw(&self, device_id: DeviceId, payload: Vec<u8>) -> Result<()> {
        let tx = self.registry.handle(device_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(DeviceCommand::Send {
            payload,
            reply: Some(reply_tx),
        })
        .await
        .map_err(|_| FieldError::not_connected(device_id))?;
        reply_rx
            .await
            .map_err(|_| FieldError::internal(format!("Device {device_id} actor dropped reply")))?
    }

    /// Encode and send a billboard command to one device
    pub async fn send_billboard(
        &self,
        device_id: DeviceId,
        command: &BillboardCommand,
    ) -> Result<()> {
        let device = self.registry.device(device_id)?;
        // Encode errors are permanent: no pending retry for these
        let payload = encode_billboard(&device, command)?;
        debug!(device_id, bytes = payload.len(), "Billboard frame dispatched");
        self.send_raw(device_id, payload).await
    }

    /// Fan a billboard command out to many devices concurrently
    ///
    /// Per-device failures are collected, never propagated: one dead sign
    /// must not stop the rest of the fleet from updating.
    pub async fn broadcast(
        &self,
        device_ids: &[DeviceId],
        command: &BillboardCommand,
    ) -> BroadcastOutcome {
        let sends = device_ids
            .iter()
            .map(|&id| async move { (id, self.send_billboard(id, command).await) });

        let mut outcome = BroadcastOutcome::default();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => outcome.succeeded.push(id),
                Err(e) => {
                    warn!(device_id = id, error = %e, "Broadcast send failed");
                    outcome.failed.push((id, e));
                }
            }
        }
        outcome
    }

    /// Full Modbus transaction through the device's actor
    async fn transact(&self, device_id: DeviceId, request: Vec<u8>) -> Result<Vec<u8>> {
        let tx = self.registry.handle(device_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(DeviceCommand::Transact {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| FieldError::not_connected(device_id))?;
        reply_rx
            .await
            .map_err(|_| FieldError::internal(format!("Device {device_id} actor dropped reply")))?
    }

    /// Read holding registers, `register` in 5-digit (40001-based) numbering
    pub async fn read_holding(
        &self,
        device: &Device,
        register: u16,
        quantity: u16,
    ) -> Result<Vec<u16>> {
        let offset = modbus::resolve_register_address(register)?;
        let transaction_id = self.next_transaction_id();
        let request =
            modbus::encode_read_holding(transaction_id, device.unit_id, offset, quantity)?;
        let pdu = self.transact(device.id, request).await?;
        modbus::decode_read_holding_response(&pdu, quantity)
    }

    /// Write holding registers, `register` in 5-digit (40001-based) numbering
    pub async fn write_registers(
        &self,
        device: &Device,
        register: u16,
        values: &[u16],
    ) -> Result<()> {
        let offset = modbus::resolve_register_address(register)?;
        let transaction_id = self.next_transaction_id();
        let request =
            modbus::encode_write_multiple(transaction_id, device.unit_id, offset, values)?;
        let pdu = self.transact(device.id, request).await?;
        modbus::decode_write_multiple_response(&pdu, offset, values.len() as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LineColor;
    use crate::config::{CircuitConfig, ReconnectConfig, TimeoutConfig};
    use crate::connection::{ActorContext, BackoffPolicy, CircuitBreaker, ReconnectScheduler};
    use crate::device::{DeviceTable, ProtocolFamily};
    use crate::sinks::{MemoryPublisher, MemorySink};
    use dashmap::DashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn registry_for(devices: Vec<Device>) -> Arc<ConnectionRegistry> {
        let breaker = Arc::new(CircuitBreaker::new(&CircuitConfig::default()));
        let statuses = Arc::new(DashMap::new());
        let scheduler = Arc::new(ReconnectScheduler::new(
            BackoffPolicy::new(&ReconnectConfig::default()),
            Arc::clone(&breaker),
            Arc::clone(&statuses),
        ));
        let ctx = Arc::new(ActorContext {
            breaker,
            scheduler,
            statuses,
            persistence: Arc::new(MemorySink::default()),
            publisher: Arc::new(MemoryPublisher::default()),
            timeouts: TimeoutConfig::default(),
        });
        Arc::new(ConnectionRegistry::new(
            Arc::new(DeviceTable::new(devices)),
            ctx,
        ))
    }

    async fn spawn_modbus_stub() -> (u16, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut request = vec![0u8; 12];
            stream.read_exact(&mut request).await.expect("read request");
            // Echo the transaction id, answer one register with value 100
            let response = vec![
                request[0], request[1], 0x00, 0x00, 0x00, 0x05, request[6], 0x03, 0x02, 0x00,
                0x64,
            ];
            stream.write_all(&response).await.expect("write response");
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_read_holding_over_loopback() {
        let (port, server) = spawn_modbus_stub().await;
        let mut device = Device::test_modbus(1, "WL-1");
        device.port = port;
        let registry = registry_for(vec![device.clone()]);
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry));

        let values = dispatcher
            .read_holding(&device, 40001, 1)
            .await
            .expect("read");
        assert_eq!(values, vec![100]);

        server.await.expect("server");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 512];
            let _ = stream.read(&mut buf).await;
        });

        let mut live = Device::test_modbus(1, "VMS-1");
        live.family = ProtocolFamily::BillboardVms;
        live.port = port;
        // Unknown device id in the list must fail without affecting the rest
        let registry = registry_for(vec![live]);
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry));

        let command = BillboardCommand::text("수위 상승", vec![LineColor::Red]);
        let outcome = dispatcher.broadcast(&[1, 99], &command).await;
        assert_eq!(outcome.succeeded, vec![1]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 99);
        assert!(!outcome.all_succeeded());

        server.await.expect("server");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_billboard_encode_error_is_permanent() {
        let mut device = Device::test_modbus(1, "LCS-1");
        device.family = ProtocolFamily::BillboardLcs;
        let registry = registry_for(vec![device]);
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry));

        // Text command on an item-slot sign never reaches the wire
        let command = BillboardCommand::text("STOP", vec![]);
        let err = dispatcher.send_billboard(1, &command).await.unwrap_err();
        assert!(matches!(err, FieldError::ProtocolError(_)));
        registry.shutdown().await;
    }
}

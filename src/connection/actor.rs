//! Per-device connection actor
//!
//! One single-writer task per device owns the socket, the connection state,
//! and the pending-message slot. Every mutation arrives as a message on the
//! actor's channel, so operations for a single device are strictly
//! sequential: a second send can never interleave with the socket write of a
//! prior send, and two sockets for one device cannot exist.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::circuit::CircuitBreaker;
use super::reconnect::ReconnectScheduler;
use super::state::{ConnState, DeviceStatus};
use crate::codec::modbus::{MbapHeader, MBAP_HEADER_LEN};
use crate::config::TimeoutConfig;
use crate::device::{Device, DeviceId};
use crate::error::{FieldError, Result};
use crate::sinks::{PersistenceSink, StatusPublisher};

/// Commands consumed by a device actor
#[derive(Debug)]
pub enum DeviceCommand {
    /// Open the connection (no-op while connecting/connected, rejected while
    /// the circuit is open)
    Connect,
    /// Write an encoded frame; connects first when necessary
    Send {
        payload: Vec<u8>,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Write a Modbus request and read back one MBAP-framed response PDU
    Transact {
        request: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    /// Tear the connection down and route it through the reconnect path
    ForceReconnect { reason: String },
    /// Administrative removal; the actor terminates
    Remove,
}

/// Outbound message parked while the device is unreachable
#[derive(Debug)]
struct PendingMessage {
    payload: Vec<u8>,
    enqueued_at: Instant,
    attempts: u32,
}

/// Everything an actor shares with the rest of the connection machinery
pub struct ActorContext {
    pub breaker: Arc<CircuitBreaker>,
    pub scheduler: Arc<ReconnectScheduler>,
    pub statuses: Arc<DashMap<DeviceId, DeviceStatus>>,
    pub persistence: Arc<dyn PersistenceSink>,
    pub publisher: Arc<dyn StatusPublisher>,
    pub timeouts: TimeoutConfig,
}

pub struct DeviceActor {
    device: Arc<Device>,
    rx: mpsc::Receiver<DeviceCommand>,
    /// Own sender, handed to the scheduler so timers can wake this actor
    tx: mpsc::Sender<DeviceCommand>,
    ctx: Arc<ActorContext>,
    state: ConnState,
    socket: Option<TcpStream>,
    pending: Option<PendingMessage>,
}

impl DeviceActor {
    pub fn spawn(
        device: Arc<Device>,
        ctx: Arc<ActorContext>,
    ) -> (mpsc::Sender<DeviceCommand>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        ctx.statuses.insert(device.id, DeviceStatus::default());

        let actor = DeviceActor {
            device,
            rx,
            tx: tx.clone(),
            ctx,
            state: ConnState::Disconnected,
            socket: None,
            pending: None,
        };
        let handle = tokio::spawn(actor.run());
        (tx, handle)
    }

    async fn run(mut self) {
        debug!(device_id = self.device.id, addr = %self.device.addr(), "Device actor started");

        while let Some(command) = self.rx.recv().await {
            match command {
                DeviceCommand::Connect => {
                    let _ = self.handle_connect().await;
                }
                DeviceCommand::Send { payload, reply } => {
                    let result = self.handle_send(payload).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                DeviceCommand::Transact { request, reply } => {
                    let result = self.handle_transact(request).await;
                    let _ = reply.send(result);
                }
                DeviceCommand::ForceReconnect { reason } => {
                    if self.state == ConnState::Connected {
                        warn!(device_id = self.device.id, %reason, "Forcing reconnect");
                        self.on_socket_lost(&reason).await;
                    }
                }
                DeviceCommand::Remove => break,
            }
        }

        self.teardown().await;
        debug!(device_id = self.device.id, "Device actor terminated");
    }

    // ------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------

    fn set_state(&mut self, next: ConnState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                device_id = self.device.id,
                from = %self.state,
                to = %next,
                "Illegal state transition ignored"
            );
            return;
        }
        debug!(device_id = self.device.id, from = %self.state, to = %next, "State transition");
        self.state = next;

        let mut entry = self.ctx.statuses.entry(self.device.id).or_default();
        entry.state = next;
        match next {
            ConnState::Connected => {
                entry.connected_at = Some(Instant::now());
                entry.last_activity = Instant::now();
            }
            ConnState::Disconnected | ConnState::Failed => entry.connected_at = None,
            _ => {}
        }
    }

    fn touch_activity(&self) {
        if let Some(mut entry) = self.ctx.statuses.get_mut(&self.device.id) {
            entry.last_activity = Instant::now();
        }
    }

    async fn report_link(&self, online: bool) {
        if let Err(e) = self
            .ctx
            .persistence
            .update_link_status(self.device.id, online)
            .await
        {
            warn!(device_id = self.device.id, error = %e, "Link status persist failed");
        }
        let payload = serde_json::json!({
            "device_id": self.device.id,
            "device_name": self.device.name,
            "online": online,
            "state": self.state.to_string(),
        });
        if let Err(e) = self.ctx.publisher.publish("device/link", payload).await {
            warn!(device_id = self.device.id, error = %e, "Link status publish failed");
        }
    }

    // ------------------------------------------------------------------
    // Connect / disconnect
    // ------------------------------------------------------------------

    async fn handle_connect(&mut self) -> Result<()> {
        if self.state.connect_is_noop() {
            debug!(device_id = self.device.id, state = %self.state, "Connect ignored");
            return Ok(());
        }
        if self.ctx.breaker.is_open(self.device.id) {
            let retry_in_ms = self
                .ctx
                .breaker
                .remaining_cooldown(self.device.id)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            debug!(
                device_id = self.device.id,
                retry_in_ms, "Connect rejected: circuit open"
            );
            return Err(FieldError::CircuitOpen {
                device_id: self.device.id,
                retry_in_ms,
            });
        }

        self.set_state(ConnState::Connecting);
        let addr = self.device.addr();

        match timeout(self.ctx.timeouts.connect(), TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(device_id = self.device.id, error = %e, "Failed to set TCP_NODELAY");
                }
                self.socket = Some(stream);
                self.set_state(ConnState::Connected);
                self.ctx.breaker.on_success(self.device.id);
                self.ctx.scheduler.cancel(self.device.id);
                info!(device_id = self.device.id, %addr, "Connected");
                self.report_link(true).await;
                self.replay_pending().await;
                Ok(())
            }
            Ok(Err(e)) => {
                self.connect_failed(&addr, FieldError::connection(format!(
                    "Connect to {addr} failed: {e}"
                )))
                .await
            }
            Err(_) => {
                self.connect_failed(&addr, FieldError::timeout(format!(
                    "Connect to {addr} timed out"
                )))
                .await
            }
        }
    }

    async fn connect_failed(&mut self, addr: &str, error: FieldError) -> Result<()> {
        warn!(device_id = self.device.id, %addr, error = %error, "Connect failed");
        self.socket = None;
        self.set_state(ConnState::Failed);
        let failures = self.ctx.breaker.on_failure(self.device.id);
        self.report_link(false).await;

        if self
            .ctx
            .scheduler
            .schedule(self.device.id, failures, self.tx.clone())
            .is_some()
        {
            self.set_state(ConnState::Reconnecting);
        }
        Err(error)
    }

    /// An established socket died (write error, peer close, health teardown).
    /// Was-connected routes through `Disconnected` and schedules immediately;
    /// duplicate loss notifications are no-ops.
    async fn on_socket_lost(&mut self, reason: &str) {
        if self.state != ConnState::Connected {
            return;
        }
        info!(device_id = self.device.id, %reason, "Connection lost");
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
        }
        self.set_state(ConnState::Disconnected);
        self.report_link(false).await;

        let failures = self.ctx.breaker.failure_count(self.device.id);
        if self
            .ctx
            .scheduler
            .schedule(self.device.id, failures, self.tx.clone())
            .is_some()
        {
            self.set_state(ConnState::Reconnecting);
        }
    }

    async fn teardown(&mut self) {
        self.ctx.scheduler.cancel(self.device.id);
        self.ctx.breaker.clear(self.device.id);
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.shutdown().await;
        }
        self.state = ConnState::Disconnected;
        self.ctx.statuses.remove(&self.device.id);
        self.pending = None;
    }

    // ------------------------------------------------------------------
    // Send / transact
    // ------------------------------------------------------------------

    async fn handle_send(&mut self, payload: Vec<u8>) -> Result<()> {
        let result = self.send_now(payload.clone()).await;
        if let Err(error) = &result {
            if error.is_recoverable() {
                self.enqueue_pending(payload);
            }
        }
        result
    }

    async fn send_now(&mut self, payload: Vec<u8>) -> Result<()> {
        if self.state != ConnState::Connected {
            self.handle_connect().await?;
        }
        self.write_frame(&payload).await
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let write_timeout = self.ctx.timeouts.write();
        let Some(socket) = self.socket.as_mut() else {
            return Err(FieldError::not_connected(self.device.id));
        };

        let outcome = timeout(write_timeout, socket.write_all(payload)).await;
        match outcome {
            Ok(Ok(())) => {
                self.touch_activity();
                debug!(
                    device_id = self.device.id,
                    bytes = payload.len(),
                    "Frame written"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let error = FieldError::from(e);
                self.on_socket_lost("write error").await;
                Err(error)
            }
            Err(_) => {
                self.on_socket_lost("write timeout").await;
                Err(FieldError::timeout(format!(
                    "Write to device {} timed out",
                    self.device.id
                )))
            }
        }
    }

    async fn handle_transact(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        if self.state != ConnState::Connected {
            self.handle_connect().await?;
        }
        self.write_frame(&request).await?;
        self.read_response(&request).await
    }

    /// Read one MBAP-framed response and return its PDU
    async fn read_response(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let response_timeout = self.ctx.timeouts.response();
        let Some(socket) = self.socket.as_mut() else {
            return Err(FieldError::not_connected(self.device.id));
        };

        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        let read = async {
            socket.read_exact(&mut header_buf).await?;
            let header = MbapHeader::decode(&header_buf)?;
            let mut pdu = vec![0u8; header.remaining()?];
            socket.read_exact(&mut pdu).await?;
            Ok::<(MbapHeader, Vec<u8>), FieldError>((header, pdu))
        };

        let outcome = timeout(response_timeout, read).await;
        match outcome {
            Ok(Ok((header, pdu))) => {
                self.touch_activity();
                let sent_tx = u16::from_be_bytes([request[0], request[1]]);
                if header.transaction_id != sent_tx {
                    return Err(FieldError::protocol(format!(
                        "Transaction id mismatch: sent {sent_tx}, got {}",
                        header.transaction_id
                    )));
                }
                Ok(pdu)
            }
            Ok(Err(e)) => {
                if e.is_recoverable() {
                    self.on_socket_lost("read error").await;
                }
                Err(e)
            }
            Err(_) => {
                self.on_socket_lost("response timeout").await;
                Err(FieldError::timeout(format!(
                    "Device {} response timed out",
                    self.device.id
                )))
            }
        }
    }

    // ------------------------------------------------------------------
    // Pending message handling
    // ------------------------------------------------------------------

    /// Park the payload for one replay after the next successful connect.
    /// A single slot per device: the latest message wins.
    fn enqueue_pending(&mut self, payload: Vec<u8>) {
        if self.pending.is_some() {
            warn!(
                device_id = self.device.id,
                "Replacing parked message; previous one dropped"
            );
        }
        self.pending = Some(PendingMessage {
            payload,
            enqueued_at: Instant::now(),
            attempts: 0,
        });
    }

    /// Retry the parked message exactly once; a second failure is terminal.
    async fn replay_pending(&mut self) {
        let Some(mut message) = self.pending.take() else {
            return;
        };
        message.attempts += 1;
        let waited_ms = message.enqueued_at.elapsed().as_millis() as u64;
        match self.write_frame(&message.payload).await {
            Ok(()) => {
                info!(
                    device_id = self.device.id,
                    waited_ms,
                    attempt = message.attempts,
                    "Parked message replayed after reconnect"
                );
            }
            Err(e) => {
                warn!(
                    device_id = self.device.id,
                    waited_ms,
                    attempt = message.attempts,
                    error = %e,
                    "Parked message dropped after failed replay"
                );
            }
        }
    }
}

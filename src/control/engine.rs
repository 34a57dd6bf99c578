//! Threshold event engine
//!
//! Polls every gauge on a fixed cadence, classifies each reading against the
//! device threshold, and turns the classification into deduplicated alarm
//! events and (for opted-in devices) automatic barrier/billboard control.
//! Readings are buffered and flushed to persistence in batches.

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::barrier::BarrierController;
use super::events::{EventDecision, EventDeduper, EVENT_TYPE_CONTROL, EVENT_TYPE_FLOOD};
use super::threshold::Band;
use crate::codec::modbus::water_level;
use crate::codec::{BillboardCommand, LineColor};
use crate::config::PollingConfig;
use crate::device::{Device, DeviceId, DeviceTable};
use crate::dispatch::MessageDispatcher;
use crate::error::Result;
use crate::sinks::{EventSink, PersistenceSink, SensorReading, StatusPublisher};

/// Billboard text pushed to linked signs when automatic control fires
const FLOOD_WARNING_TEXT: &str = "침수 위험\n진입 금지";

/// Upper bound on readings retained across failed flushes; beyond this the
/// oldest samples are dropped rather than growing the buffer forever against
/// a persistence sink that stays down
const MAX_BUFFERED_READINGS: usize = 4096;

pub struct ThresholdEngine {
    devices: Arc<DeviceTable>,
    dispatcher: Arc<MessageDispatcher>,
    barrier: Arc<BarrierController>,
    deduper: Arc<EventDeduper>,
    persistence: Arc<dyn PersistenceSink>,
    events: Arc<dyn EventSink>,
    publisher: Arc<dyn StatusPublisher>,
    config: PollingConfig,
    /// Latest clamped value per gauge
    latest: DashMap<DeviceId, f64>,
    /// Readings waiting for the next batch flush
    batch: Mutex<Vec<SensorReading>>,
    /// Last flood-register state per device, for edge-triggered control
    flood_state: Mutex<HashMap<DeviceId, bool>>,
}

impl ThresholdEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        devices: Arc<DeviceTable>,
        dispatcher: Arc<MessageDispatcher>,
        barrier: Arc<BarrierController>,
        deduper: Arc<EventDeduper>,
        persistence: Arc<dyn PersistenceSink>,
        events: Arc<dyn EventSink>,
        publisher: Arc<dyn StatusPublisher>,
        config: PollingConfig,
    ) -> Self {
        Self {
            devices,
            dispatcher,
            barrier,
            deduper,
            persistence,
            events,
            publisher,
            config,
            latest: DashMap::new(),
            batch: Mutex::new(Vec::new()),
            flood_state: Mutex::new(HashMap::new()),
        }
    }

    /// Run the poll/flush loop until cancelled; flushes once more on the way out
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut poll = tokio::time::interval(self.config.interval());
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut flush = tokio::time::interval(self.config.flush_interval());
            flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Both intervals fire immediately; consume the flush tick so the
            // first flush waits a full period
            flush.tick().await;

            info!(
                poll_secs = self.config.interval_secs,
                flush_secs = self.config.flush_interval_secs,
                gauges = self.devices.gauges().len(),
                "Threshold engine started"
            );

            loop {
                tokio::select! {
                    _ = poll.tick() => self.poll_all().await,
                    _ = flush.tick() => self.flush_batch().await,
                    _ = shutdown.cancelled() => {
                        info!("Threshold engine stopping");
                        self.flush_batch().await;
                        break;
                    }
                }
            }
        })
    }

    /// Poll every gauge concurrently; one slow device must not delay the rest
    async fn poll_all(&self) {
        let gauges = self.devices.gauges();
        let polls = gauges.iter().map(|device| async move {
            if let Err(e) = self.poll_device(device).await {
                warn!(device_id = device.id, error = %e, "Gauge poll failed");
            }
        });
        join_all(polls).await;
    }

    async fn poll_device(&self, device: &Arc<Device>) -> Result<()> {
        // gauges() guarantees both are present
        let (Some(register), Some(threshold)) = (device.level_register, device.threshold) else {
            return Ok(());
        };
        let values = self.dispatcher.read_holding(device, register, 1).await?;
        let raw = values.first().copied().unwrap_or(0);
        self.handle_level(device, raw, threshold).await;

        if device.auto_control {
            self.check_flood_status(device).await;
        }
        Ok(())
    }

    /// Record one sample and surface its classification
    pub async fn handle_level(&self, device: &Arc<Device>, raw: u16, threshold: f64) {
        let value = f64::from(water_level(raw));
        let reading = SensorReading {
            device_id: device.id,
            raw_value: raw,
            value,
            timestamp: Utc::now(),
        };
        self.batch.lock().push(reading);
        self.latest.insert(device.id, value);

        if let Err(e) = self.persistence.set_current_value(device.id, value).await {
            warn!(device_id = device.id, error = %e, "Current value update failed");
        }

        let band = Band::classify(value, threshold);
        let payload = serde_json::json!({
            "device_id": device.id,
            "device_name": device.name,
            "value": value,
            "threshold": threshold,
            "band": band.label(),
        });
        if let Err(e) = self.publisher.publish("device/reading", payload.clone()).await {
            warn!(device_id = device.id, error = %e, "Reading publish failed");
        }

        if band.raises_event() {
            let decision = self.deduper.observe(
                EVENT_TYPE_FLOOD,
                device.id,
                &device.name,
                band.severity(),
                payload,
            );
            self.apply_decision(decision).await;
        }
    }

    async fn apply_decision(&self, decision: EventDecision) {
        match decision {
            EventDecision::Raise(record) => {
                info!(
                    device_id = record.device_id,
                    severity = ?record.severity,
                    event_type = %record.event_type,
                    "Event raised"
                );
                if let Err(e) = self.events.emit_event(&record).await {
                    error!(device_id = record.device_id, error = %e, "Event emit failed");
                }
                let _ = self
                    .publisher
                    .publish("event/raised", serde_json::json!(record))
                    .await;
            }
            EventDecision::Upgrade(record) => {
                info!(
                    device_id = record.device_id,
                    severity = ?record.severity,
                    "Outstanding event upgraded"
                );
                let _ = self
                    .publisher
                    .publish("event/updated", serde_json::json!(record))
                    .await;
            }
            EventDecision::Suppressed => {}
        }
    }

    /// Edge-triggered automatic control off the flood status register
    async fn check_flood_status(&self, device: &Arc<Device>) {
        let Some(register) = device.flood_register else {
            return;
        };
        let flooded = match self.dispatcher.read_holding(device, register, 1).await {
            Ok(values) => values.first().copied().unwrap_or(0) != 0,
            Err(e) => {
                warn!(device_id = device.id, error = %e, "Flood status read failed");
                return;
            }
        };

        let was_flooded = self
            .flood_state
            .lock()
            .insert(device.id, flooded)
            .unwrap_or(false);
        if !flooded || was_flooded {
            return;
        }

        warn!(device_id = device.id, name = %device.name, "Flood detected, automatic control engaged");
        self.engage_auto_control(device).await;
    }

    /// Three independent actions; a failure in one never blocks the others
    async fn engage_auto_control(&self, device: &Arc<Device>) {
        if let Err(e) = self.barrier.run(device).await {
            error!(device_id = device.id, error = %e, "Automatic barrier run failed");
        }

        if !device.linked_billboards.is_empty() {
            let command = BillboardCommand::text(FLOOD_WARNING_TEXT, vec![LineColor::Red]);
            let outcome = self
                .dispatcher
                .broadcast(&device.linked_billboards, &command)
                .await;
            if !outcome.all_succeeded() {
                warn!(
                    device_id = device.id,
                    failed = outcome.failed.len(),
                    "Some linked billboards missed the flood warning"
                );
            }
        }

        let decision = self.deduper.observe(
            EVENT_TYPE_CONTROL,
            device.id,
            &device.name,
            crate::sinks::Severity::CriticalSevere,
            serde_json::json!({
                "device_id": device.id,
                "device_name": device.name,
                "action": "barrier-run",
                "billboards": device.linked_billboards,
            }),
        );
        self.apply_decision(decision).await;
    }

    /// Drain the reading buffer into persistence; re-queued on failure
    async fn flush_batch(&self) {
        let readings: Vec<SensorReading> = std::mem::take(&mut *self.batch.lock());
        if readings.is_empty() {
            return;
        }
        debug!(count = readings.len(), "Flushing reading batch");
        if let Err(e) = self.persistence.append_readings(&readings).await {
            error!(count = readings.len(), error = %e, "Batch flush failed, re-queuing");
            let mut batch = self.batch.lock();
            let newer = std::mem::replace(&mut *batch, readings);
            batch.extend(newer);
            let overflow = batch.len().saturating_sub(MAX_BUFFERED_READINGS);
            if overflow > 0 {
                batch.drain(..overflow);
                warn!(dropped = overflow, "Reading backlog full, oldest samples dropped");
            }
        }
    }

    /// Operator acknowledgment; frees the dedup slot for the pair
    pub async fn acknowledge(&self, event_type: &str, device_name: &str) -> bool {
        let cleared = self.deduper.acknowledge(event_type, device_name);
        if cleared {
            info!(event_type, device_name, "Event acknowledged");
            let _ = self
                .publisher
                .publish(
                    "event/acknowledged",
                    serde_json::json!({
                        "event_type": event_type,
                        "device_name": device_name,
                    }),
                )
                .await;
        }
        cleared
    }

    /// Unacknowledged events (operator console view)
    pub fn outstanding_events(&self) -> Vec<crate::sinks::EventRecord> {
        self.deduper.outstanding()
    }

    /// Most recent clamped value for a gauge, if it has been polled
    pub fn latest_value(&self, device_id: DeviceId) -> Option<f64> {
        self.latest.get(&device_id).map(|v| *v)
    }
}

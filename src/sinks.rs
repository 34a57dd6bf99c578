//! External collaborator contracts
//!
//! Persistence, event log, and status broadcast are out-of-process concerns;
//! this subsystem only sees the narrow contracts below. The binary wires the
//! tracing-backed implementations; integration tests use the in-memory ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::device::DeviceId;
use crate::error::Result;

/// One water-level sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: DeviceId,
    /// Raw 16-bit register value as read off the wire
    pub raw_value: u16,
    /// Signed, noise-floor-clamped value
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Event severities, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Attention,
    Caution,
    Warning,
    CriticalSevere,
    CriticalEvacuate,
}

/// One alarm/control event handed to the event sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub severity: Severity,
    /// `(event_type, device_name)` pair used for unacknowledged suppression
    pub dedup_key: (String, String),
    pub device_id: DeviceId,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub payload: serde_json::Value,
}

/// Persistence sink for link status and sensor history
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn update_link_status(&self, device_id: DeviceId, online: bool) -> Result<()>;
    /// Append a batch of readings (batched by the caller to bound write volume)
    async fn append_readings(&self, readings: &[SensorReading]) -> Result<()>;
    /// Overwrite the cached current value for a device
    async fn set_current_value(&self, device_id: DeviceId, value: f64) -> Result<()>;
}

/// Event-log sink for alarm and control events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit_event(&self, event: &EventRecord) -> Result<()>;
}

/// Status broadcast for UI subscribers (link-status changes, reading updates)
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;
}

// ============================================================================
// Tracing-backed implementations (default wiring in the binary)
// ============================================================================

/// Sink that records everything to the structured log only
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl PersistenceSink for LogSink {
    async fn update_link_status(&self, device_id: DeviceId, online: bool) -> Result<()> {
        info!(device_id, online, "link status");
        Ok(())
    }

    async fn append_readings(&self, readings: &[SensorReading]) -> Result<()> {
        info!(count = readings.len(), "reading batch");
        Ok(())
    }

    async fn set_current_value(&self, device_id: DeviceId, value: f64) -> Result<()> {
        info!(device_id, value, "current value");
        Ok(())
    }
}

#[async_trait]
impl EventSink for LogSink {
    async fn emit_event(&self, event: &EventRecord) -> Result<()> {
        info!(
            event_type = %event.event_type,
            severity = ?event.severity,
            device_id = event.device_id,
            "event"
        );
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for LogSink {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        info!(topic, %payload, "status publish");
        Ok(())
    }
}

// ============================================================================
// In-memory implementations for tests
// ============================================================================

/// In-memory persistence sink capturing all calls
#[derive(Debug, Default)]
pub struct MemorySink {
    pub link_status: Mutex<Vec<(DeviceId, bool)>>,
    pub readings: Mutex<Vec<SensorReading>>,
    pub current_values: Mutex<Vec<(DeviceId, f64)>>,
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn update_link_status(&self, device_id: DeviceId, online: bool) -> Result<()> {
        self.link_status.lock().push((device_id, online));
        Ok(())
    }

    async fn append_readings(&self, readings: &[SensorReading]) -> Result<()> {
        self.readings.lock().extend_from_slice(readings);
        Ok(())
    }

    async fn set_current_value(&self, device_id: DeviceId, value: f64) -> Result<()> {
        self.current_values.lock().push((device_id, value));
        Ok(())
    }
}

/// In-memory event sink capturing emitted events
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    pub events: Mutex<Vec<EventRecord>>,
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit_event(&self, event: &EventRecord) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// In-memory status publisher capturing topic/payload pairs
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    pub published: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl StatusPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

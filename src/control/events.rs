//! Event deduplication
//!
//! At most one unacknowledged record per `(event_type, device_name)` pair.
//! While a record is outstanding, repeat observations at the same or lower
//! severity are suppressed; a higher severity upgrades the record in place.
//! Acknowledging the pair clears the slot so the next observation raises a
//! fresh record.

use chrono::Utc;
use dashmap::DashMap;

use crate::device::DeviceId;
use crate::sinks::{EventRecord, Severity};

/// Flood events share a single type per device
pub const EVENT_TYPE_FLOOD: &str = "flood";
/// Automatic barrier actuation
pub const EVENT_TYPE_CONTROL: &str = "auto-control";

/// What the engine should do with an observation
#[derive(Debug, Clone)]
pub enum EventDecision {
    /// First observation for the pair: emit to the event sink
    Raise(EventRecord),
    /// Severity rose while unacknowledged: publish the updated record only
    Upgrade(EventRecord),
    /// Same or lower severity while unacknowledged: nothing to do
    Suppressed,
}

/// Unacknowledged-event store keyed by dedup pair
#[derive(Debug, Default)]
pub struct EventDeduper {
    active: DashMap<(String, String), EventRecord>,
}

impl EventDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and decide whether it surfaces
    pub fn observe(
        &self,
        event_type: &str,
        device_id: DeviceId,
        device_name: &str,
        severity: Severity,
        payload: serde_json::Value,
    ) -> EventDecision {
        let key = (event_type.to_string(), device_name.to_string());

        if let Some(mut existing) = self.active.get_mut(&key) {
            if severity > existing.severity {
                existing.severity = severity;
                existing.payload = payload;
                return EventDecision::Upgrade(existing.clone());
            }
            return EventDecision::Suppressed;
        }

        let record = EventRecord {
            event_type: event_type.to_string(),
            severity,
            dedup_key: key.clone(),
            device_id,
            created_at: Utc::now(),
            acknowledged: false,
            payload,
        };
        self.active.insert(key, record.clone());
        EventDecision::Raise(record)
    }

    /// Acknowledge the outstanding record for the pair, freeing the slot
    pub fn acknowledge(&self, event_type: &str, device_name: &str) -> bool {
        self.active
            .remove(&(event_type.to_string(), device_name.to_string()))
            .is_some()
    }

    /// Snapshot of the outstanding records
    pub fn outstanding(&self) -> Vec<EventRecord> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deduper() -> EventDeduper {
        EventDeduper::new()
    }

    #[test]
    fn test_first_observation_raises() {
        let d = deduper();
        let decision = d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        assert!(matches!(decision, EventDecision::Raise(_)));
        assert_eq!(d.outstanding().len(), 1);
    }

    #[test]
    fn test_repeat_same_severity_suppressed() {
        let d = deduper();
        d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        let decision = d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        assert!(matches!(decision, EventDecision::Suppressed));
        assert_eq!(d.outstanding().len(), 1);
    }

    #[test]
    fn test_higher_severity_upgrades_in_place() {
        let d = deduper();
        d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        let decision = d.observe(
            EVENT_TYPE_FLOOD,
            1,
            "WL-1",
            Severity::CriticalEvacuate,
            json!({"value": 101}),
        );
        match decision {
            EventDecision::Upgrade(record) => {
                assert_eq!(record.severity, Severity::CriticalEvacuate);
            }
            other => panic!("expected upgrade, got {other:?}"),
        }
        // Still a single outstanding record
        let outstanding = d.outstanding();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].severity, Severity::CriticalEvacuate);
    }

    #[test]
    fn test_lower_severity_does_not_downgrade() {
        let d = deduper();
        d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::CriticalSevere, json!({}));
        let decision = d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        assert!(matches!(decision, EventDecision::Suppressed));
        assert_eq!(d.outstanding()[0].severity, Severity::CriticalSevere);
    }

    #[test]
    fn test_acknowledge_frees_the_slot() {
        let d = deduper();
        d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        assert!(d.acknowledge(EVENT_TYPE_FLOOD, "WL-1"));
        assert!(!d.acknowledge(EVENT_TYPE_FLOOD, "WL-1"));

        let decision = d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        assert!(matches!(decision, EventDecision::Raise(_)));
    }

    #[test]
    fn test_devices_deduplicate_independently() {
        let d = deduper();
        d.observe(EVENT_TYPE_FLOOD, 1, "WL-1", Severity::Warning, json!({}));
        let decision = d.observe(EVENT_TYPE_FLOOD, 2, "WL-2", Severity::Warning, json!({}));
        assert!(matches!(decision, EventDecision::Raise(_)));
        assert_eq!(d.outstanding().len(), 2);
    }
}

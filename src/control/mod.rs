//! Threshold-driven alarms and automatic control

pub mod barrier;
pub mod engine;
pub mod events;
pub mod threshold;

pub use barrier::BarrierController;
pub use engine::ThresholdEngine;
pub use events::{EventDecision, EventDeduper, EVENT_TYPE_CONTROL, EVENT_TYPE_FLOOD};
pub use threshold::Band;

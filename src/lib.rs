//! Field device connection and protocol control service
//!
//! Keeps a fleet of tunnel field devices (water-level gauges, flood barriers,
//! electronic billboards) connected over TCP, speaks their wire protocols,
//! and turns sensor readings into deduplicated alarm events and automatic
//! barrier/billboard control.

pub mod codec;
pub mod config;
pub mod connection;
pub mod control;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod sinks;

pub use config::Config;
pub use connection::{ActorContext, ConnectionRegistry};
pub use control::ThresholdEngine;
pub use device::{Device, DeviceId, DeviceTable, ProtocolFamily};
pub use dispatch::{BroadcastOutcome, MessageDispatcher};
pub use error::{FieldError, Result};

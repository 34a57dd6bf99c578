//! Connection lifecycle management
//!
//! Per-device actors behind a registry, with circuit breaking, scheduled
//! reconnects, and a periodic health sweep. The layering is strict: the
//! registry spawns actors, actors own sockets, and everything else observes
//! through the shared status map.

pub mod actor;
pub mod circuit;
pub mod health;
pub mod reconnect;
pub mod registry;
pub mod state;

pub use actor::{ActorContext, DeviceCommand};
pub use circuit::CircuitBreaker;
pub use health::start_health_monitor;
pub use reconnect::{BackoffPolicy, ReconnectScheduler};
pub use registry::ConnectionRegistry;
pub use state::{ConnState, DeviceStatus};

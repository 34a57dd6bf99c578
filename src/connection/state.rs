//! Connection state machine
//!
//! One `ConnState` per device, mutated only by that device's actor. The
//! transition guard encodes the lifecycle: a connect attempt from
//! `Connecting`/`Connected` is a no-op, and only a previously `Connected`
//! socket routes a close through `Disconnected` (duplicate close events must
//! not trigger reconnect storms).

use std::time::Instant;

/// Per-device connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Initial state; also terminal after administrative removal
    Disconnected,
    /// TCP connect in flight
    Connecting,
    /// Live socket
    Connected,
    /// Reconnect timer armed
    Reconnecting,
    /// Last connect attempt failed
    Failed,
}

impl ConnState {
    /// Whether the FSM admits the transition
    pub fn can_transition_to(self, next: ConnState) -> bool {
        use ConnState::*;
        // Administrative removal forces Disconnected from anywhere
        if next == Disconnected {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Reconnecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Reconnecting, Connecting)
                | (Failed, Reconnecting)
                | (Failed, Connecting)
        )
    }

    /// States in which a new connect request is ignored
    pub fn connect_is_noop(self) -> bool {
        matches!(self, ConnState::Connecting | ConnState::Connected)
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Connected => "connected",
            ConnState::Reconnecting => "reconnecting",
            ConnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a device's connection, readable outside the actor
#[derive(Debug, Clone, Copy)]
pub struct DeviceStatus {
    pub state: ConnState,
    pub last_activity: Instant,
    pub connected_at: Option<Instant>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            state: ConnState::Disconnected,
            last_activity: Instant::now(),
            connected_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
    }

    #[test]
    fn test_failure_path_transitions() {
        assert!(Connecting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Reconnecting));
        assert!(Failed.can_transition_to(Connecting));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Reconnecting.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Failed));
    }

    #[test]
    fn test_admin_remove_from_anywhere() {
        for state in [Disconnected, Connecting, Connected, Reconnecting, Failed] {
            assert!(state.can_transition_to(Disconnected));
        }
    }

    #[test]
    fn test_connect_noop_states() {
        assert!(Connecting.connect_is_noop());
        assert!(Connected.connect_is_noop());
        assert!(!Reconnecting.connect_is_noop());
        assert!(!Failed.connect_is_noop());
    }
}

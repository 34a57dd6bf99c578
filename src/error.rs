//! Error handling for the field device service
//!
//! One service-wide error enum with string payloads and helper constructors.
//! Connection-class errors are recovered internally by the reconnect
//! machinery; they only reach a caller as the outcome of a single command.

use thiserror::Error;

/// Field service error type
#[derive(Error, Debug, Clone)]
pub enum FieldError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Wire protocol errors (malformed response, unsupported command, encode failure)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Connection establishment and maintenance errors (refused, reset, not connected)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timeout errors (connect, write, response)
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Circuit breaker is open for the device; reconnects suppressed until cool-down
    #[error("Circuit open for device {device_id}, retry in {retry_in_ms} ms")]
    CircuitOpen { device_id: u32, retry_in_ms: u64 },

    /// Device id is not present in the device table
    #[error("Unknown device: {0}")]
    DeviceUnknown(u32),

    /// Data handling errors (serialization, parsing, conversion)
    #[error("Data error: {0}")]
    DataError(String),

    /// Sink errors (persistence, event log, status broadcast)
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the field service
pub type Result<T> = std::result::Result<T, FieldError>;

impl FieldError {
    pub fn config(msg: impl Into<String>) -> Self {
        FieldError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        FieldError::IoError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        FieldError::ProtocolError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        FieldError::ConnectionError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        FieldError::TimeoutError(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        FieldError::DataError(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        FieldError::SinkError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        FieldError::InternalError(msg.into())
    }

    pub fn not_connected(device_id: u32) -> Self {
        FieldError::ConnectionError(format!("Device {device_id} not connected"))
    }

    /// True for errors that the reconnect machinery handles on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FieldError::ConnectionError(_)
                | FieldError::TimeoutError(_)
                | FieldError::IoError(_)
                | FieldError::CircuitOpen { .. }
        )
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for FieldError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => FieldError::TimeoutError(err.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe => FieldError::ConnectionError(err.to_string()),
            _ => FieldError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(err: serde_json::Error) -> Self {
        FieldError::DataError(format!("JSON: {err}"))
    }
}

impl From<serde_yaml::Error> for FieldError {
    fn from(err: serde_yaml::Error) -> Self {
        FieldError::DataError(format!("YAML: {err}"))
    }
}

impl From<figment::Error> for FieldError {
    fn from(err: figment::Error) -> Self {
        FieldError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn protocol_error(self, msg: &str) -> Result<T>;
    fn connection_error(self, msg: &str) -> Result<T>;
    fn data_error(self, msg: &str) -> Result<T>;
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::ConfigError(format!("{msg}: {e}")))
    }

    fn protocol_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::ProtocolError(format!("{msg}: {e}")))
    }

    fn connection_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::ConnectionError(format!("{msg}: {e}")))
    }

    fn data_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::DataError(format!("{msg}: {e}")))
    }

    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| FieldError::InternalError(format!("{msg}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            FieldError::from(refused),
            FieldError::ConnectionError(_)
        ));

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            FieldError::from(timed_out),
            FieldError::TimeoutError(_)
        ));
    }

    #[test]
    fn test_recoverable() {
        assert!(FieldError::not_connected(7).is_recoverable());
        assert!(!FieldError::protocol("bad frame").is_recoverable());
        assert!(!FieldError::DeviceUnknown(3).is_recoverable());
    }

    #[test]
    fn test_error_context() {
        let r: std::result::Result<(), &str> = Err("boom");
        let e = r.connection_error("connect to 10.0.0.5").unwrap_err();
        assert!(e.to_string().contains("connect to 10.0.0.5"));
        assert!(e.to_string().contains("boom"));
    }
}

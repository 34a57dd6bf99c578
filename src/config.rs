//! Service configuration
//!
//! Layered loading: built-in defaults, then a YAML file, then `FIELDSRV_`
//! environment overrides. Every timing knob carries the production default
//! from the control-room deployment.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::device::Device;
use crate::error::{FieldError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service identity and logging
    #[serde(default)]
    pub service: ServiceConfig,

    /// Socket timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Reconnect backoff policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Health monitor sweep
    #[serde(default)]
    pub health: HealthConfig,

    /// Sensor polling and persistence batching
    #[serde(default)]
    pub polling: PollingConfig,

    /// Barrier actuation
    #[serde(default)]
    pub barrier: BarrierConfig,

    /// Field device table
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file path (daily rolling)
    #[serde(default)]
    pub log_file: Option<String>,
}

/// Socket timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_secs: u64,

    /// Message write timeout in seconds
    #[serde(default = "default_write_timeout_secs")]
    pub write_secs: u64,

    /// Request/response timeout for Modbus reads, in seconds
    #[serde(default = "default_response_timeout_secs")]
    pub response_secs: u64,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds (doubled per consecutive failure)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter fraction applied to the computed delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cool-down in seconds while the circuit stays open
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Max inactivity in seconds before a connected device is torn down
    #[serde(default = "default_max_inactive_secs")]
    pub max_inactive_secs: u64,
}

/// Sensor polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Reading batch flush interval in seconds
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

/// Barrier actuation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Run pulse duration in milliseconds before the run bit auto-clears
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
}

fn default_service_name() -> String {
    "fieldsrv".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_response_timeout_secs() -> u64 {
    10
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter() -> f64 {
    0.2
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_max_inactive_secs() -> u64 {
    60
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_flush_interval_secs() -> u64 {
    300
}
fn default_pulse_ms() -> u64 {
    2_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout_secs(),
            write_secs: default_write_timeout_secs(),
            response_secs: default_response_timeout_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            max_inactive_secs: default_max_inactive_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            pulse_ms: default_pulse_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
    pub fn response(&self) -> Duration {
        Duration::from_secs(self.response_secs)
    }
}

impl HealthConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
    pub fn max_inactive(&self) -> Duration {
        Duration::from_secs(self.max_inactive_secs)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl BarrierConfig {
    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}

impl Config {
    /// Load configuration from an optional YAML file plus environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = path {
            if !Path::new(path).exists() {
                return Err(FieldError::config(format!("Config file not found: {path}")));
            }
            figment = figment.merge(Yaml::file(path));
        } else {
            // Conventional lookup locations
            for candidate in ["config/fieldsrv.yaml", "fieldsrv.yaml"] {
                if Path::new(candidate).exists() {
                    figment = figment.merge(Yaml::file(candidate));
                    break;
                }
            }
        }

        let config: Config = figment
            .merge(Env::prefixed("FIELDSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.reconnect.base_delay_ms == 0 {
            return Err(FieldError::config("reconnect.base_delay_ms must be > 0"));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(FieldError::config(
                "reconnect.max_delay_ms must be >= base_delay_ms",
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(FieldError::config("reconnect.jitter must be in [0, 1]"));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(FieldError::config("circuit.failure_threshold must be > 0"));
        }

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id) {
                return Err(FieldError::config(format!(
                    "Duplicate device id: {}",
                    device.id
                )));
            }
            device.validate()?;
        }
        Ok(())
    }
}

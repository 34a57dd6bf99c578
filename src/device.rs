//! Field device records
//!
//! The device table is provided by the (external) registry layer; this module
//! holds the in-process representation and the closed set of protocol
//! families. Protocol selection is an exhaustive enum match everywhere, never
//! a runtime string comparison.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FieldError, Result};

/// Device identifier as assigned by the registry
pub type DeviceId = u32;

/// Closed set of wire protocol families spoken by the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolFamily {
    /// VMS electronic billboard (text protocol, EUC-KR)
    BillboardVms,
    /// LCS billboard (pre-provisioned item slots)
    BillboardLcs,
    /// Dabit billboard (framed STX/ETX protocol)
    BillboardDabit,
    /// Modbus TCP slave (gauges, barriers, alarm panels)
    Modbus,
}

impl ProtocolFamily {
    /// True for families that carry sensor registers
    pub fn is_modbus(&self) -> bool {
        matches!(self, ProtocolFamily::Modbus)
    }

    /// True for message billboards of any vendor
    pub fn is_billboard(&self) -> bool {
        matches!(
            self,
            ProtocolFamily::BillboardVms
                | ProtocolFamily::BillboardLcs
                | ProtocolFamily::BillboardDabit
        )
    }
}

impl std::fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProtocolFamily::BillboardVms => "billboard-vms",
            ProtocolFamily::BillboardLcs => "billboard-lcs",
            ProtocolFamily::BillboardDabit => "billboard-dabit",
            ProtocolFamily::Modbus => "modbus",
        };
        f.write_str(s)
    }
}

/// One field device as known to the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub family: ProtocolFamily,

    /// Optional login/session credentials for the device
    #[serde(default)]
    pub credentials: Option<String>,

    /// Water-level threshold; externally configurable, only meaningful for gauges
    #[serde(default)]
    pub threshold: Option<f64>,

    /// Modbus unit id (slave address)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Holding register (5-digit numbering) carrying the water level
    #[serde(default)]
    pub level_register: Option<u16>,

    /// Holding register (5-digit numbering) indicating flood status
    #[serde(default)]
    pub flood_register: Option<u16>,

    /// Holding register (5-digit numbering) driving barrier/curtain actuation
    #[serde(default)]
    pub barrier_register: Option<u16>,

    /// Whether the threshold engine may actuate barriers/billboards for this device
    #[serde(default)]
    pub auto_control: bool,

    /// Billboard devices to warn when this gauge triggers automatic control
    #[serde(default)]
    pub linked_billboards: Vec<DeviceId>,
}

fn default_unit_id() -> u8 {
    1
}

impl Device {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FieldError::config(format!(
                "Device {} has an empty name",
                self.id
            )));
        }
        if self.host.is_empty() {
            return Err(FieldError::config(format!(
                "Device {} has an empty host",
                self.id
            )));
        }
        if self.port == 0 {
            return Err(FieldError::config(format!(
                "Device {} has port 0",
                self.id
            )));
        }
        if self.auto_control && !self.family.is_modbus() {
            return Err(FieldError::config(format!(
                "Device {}: auto_control requires a modbus device",
                self.id
            )));
        }
        Ok(())
    }

    /// Minimal Modbus gauge record for tests
    #[cfg(test)]
    pub fn test_modbus(id: DeviceId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            family: ProtocolFamily::Modbus,
            credentials: None,
            threshold: Some(100.0),
            unit_id: 1,
            level_register: Some(40001),
            flood_register: Some(40002),
            barrier_register: Some(40003),
            auto_control: false,
            linked_billboards: Vec::new(),
        }
    }
}

/// Immutable snapshot of the registry's device records, keyed by id
#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: HashMap<DeviceId, Arc<Device>>,
}

impl DeviceTable {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.id, Arc::new(d)))
                .collect(),
        }
    }

    pub fn get(&self, id: DeviceId) -> Result<Arc<Device>> {
        self.devices
            .get(&id)
            .cloned()
            .ok_or(FieldError::DeviceUnknown(id))
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    /// Modbus devices that carry a threshold (the pollable gauges)
    pub fn gauges(&self) -> Vec<Arc<Device>> {
        self.devices
            .values()
            .filter(|d| d.family.is_modbus() && d.threshold.is_some() && d.level_register.is_some())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_serde_tags() {
        let family: ProtocolFamily = serde_yaml::from_str("billboard-vms").unwrap();
        assert_eq!(family, ProtocolFamily::BillboardVms);
        let family: ProtocolFamily = serde_yaml::from_str("modbus").unwrap();
        assert_eq!(family, ProtocolFamily::Modbus);
        assert!(serde_yaml::from_str::<ProtocolFamily>("opcua").is_err());
    }

    #[test]
    fn test_table_lookup() {
        let table = DeviceTable::new(vec![Device::test_modbus(7, "WL-7")]);
        assert!(table.contains(7));
        assert_eq!(table.get(7).unwrap().name, "WL-7");
        assert!(matches!(
            table.get(8).unwrap_err(),
            FieldError::DeviceUnknown(8)
        ));
    }

    #[test]
    fn test_gauges_filter() {
        let mut billboard = Device::test_modbus(2, "VMS-1");
        billboard.family = ProtocolFamily::BillboardVms;
        billboard.threshold = None;
        billboard.level_register = None;

        let table = DeviceTable::new(vec![Device::test_modbus(1, "WL-1"), billboard]);
        let gauges = table.gauges();
        assert_eq!(gauges.len(), 1);
        assert_eq!(gauges[0].id, 1);
    }

    #[test]
    fn test_auto_control_requires_modbus() {
        let mut device = Device::test_modbus(3, "VMS-3");
        device.family = ProtocolFamily::BillboardVms;
        device.auto_control = true;
        assert!(device.validate().is_err());
    }
}

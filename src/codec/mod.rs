//! Wire protocol codecs
//!
//! One sub-codec per protocol family; dispatch is an exhaustive match on the
//! closed `ProtocolFamily` enum. Everything in here is pure — no sockets, no
//! clock.

pub mod charset;
pub mod dabit;
pub mod lcs;
pub mod modbus;
pub mod vms;

pub use vms::{LineColor, PageMode};

use crate::device::{Device, ProtocolFamily};
use crate::error::{FieldError, Result};

/// High-level billboard command, resolved to bytes per device family
#[derive(Debug, Clone)]
pub enum BillboardCommand {
    /// Free text (VMS and Dabit signs)
    Text {
        message: String,
        colors: Vec<LineColor>,
    },
    /// Pre-provisioned item slot (LCS signs)
    Item { number: String },
}

impl BillboardCommand {
    pub fn text(message: impl Into<String>, colors: Vec<LineColor>) -> Self {
        BillboardCommand::Text {
            message: message.into(),
            colors,
        }
    }

    pub fn item(number: impl Into<String>) -> Self {
        BillboardCommand::Item {
            number: number.into(),
        }
    }
}

/// Encode a billboard command for the given device
pub fn encode_billboard(device: &Device, command: &BillboardCommand) -> Result<Vec<u8>> {
    match (device.family, command) {
        (ProtocolFamily::BillboardVms, BillboardCommand::Text { message, colors }) => {
            vms::encode(message, colors, PageMode::default())
        }
        (ProtocolFamily::BillboardDabit, BillboardCommand::Text { message, colors }) => {
            let color = colors.first().copied().unwrap_or_default();
            dabit::encode(device.id as u16, message, color)
        }
        (ProtocolFamily::BillboardLcs, BillboardCommand::Item { number }) => lcs::encode(number),
        (family, command) => Err(FieldError::protocol(format!(
            "Unsupported command {command:?} for protocol family {family}"
        ))),
    }
}

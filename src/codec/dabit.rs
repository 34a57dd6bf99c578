//! Dabit billboard codec
//!
//! Framed protocol: `STX(2B) + deviceId(2 chars) + length(4 hex chars) +
//! CMD + attributes + per-character color codes + hex-encoded EUC-KR text +
//! ETX(2B)`. The color string carries one 2-digit code per character, with an
//! extra `00` per multi-byte (Korean) character so the codes stay aligned to
//! the transcoded bytes.

use super::charset::{euc_kr_width, hex_upper, to_euc_kr};
use super::vms::LineColor;
use crate::error::{FieldError, Result};

/// Frame start marker
pub const STX: [u8; 2] = [0x10, 0x02];
/// Frame end marker
pub const ETX: [u8; 2] = [0x10, 0x03];

/// Display-text command byte pair
const CMD_TEXT: &str = "30";
/// Fixed display attributes: effect 0 (static), speed 1
const ATTRS: &str = "01";

/// Encode a text message for a Dabit billboard
pub fn encode(device_id: u16, text: &str, color: LineColor) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Err(FieldError::protocol("Dabit message is empty"));
    }
    if device_id > 99 {
        return Err(FieldError::protocol(format!(
            "Dabit device id out of range: {device_id}"
        )));
    }

    let color_codes = color_string(text, color);
    let hex_text = hex_upper(&to_euc_kr(text)?);

    let body = format!("{CMD_TEXT}{ATTRS}{color_codes}{hex_text}");

    let mut frame = Vec::with_capacity(body.len() + 10);
    frame.extend_from_slice(&STX);
    frame.extend_from_slice(format!("{device_id:02}").as_bytes());
    frame.extend_from_slice(format!("{:04X}", body.len()).as_bytes());
    frame.extend_from_slice(body.as_bytes());
    frame.extend_from_slice(&ETX);
    Ok(frame)
}

/// Per-character color codes, byte-aligned to the EUC-KR text
fn color_string(text: &str, color: LineColor) -> String {
    let code = format!("{:02}", color.code());
    let mut out = String::new();
    for ch in text.chars() {
        out.push_str(&code);
        if euc_kr_width(ch) > 1 {
            out.push_str("00");
        }
    }
    out
}

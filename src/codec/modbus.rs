//! Modbus TCP codec
//!
//! MBAP framing plus the two PDUs this fleet uses: FC 0x03 (read holding
//! registers) and FC 0x10 (write multiple registers). Register numbers are
//! translated from the 5-digit `40001`-based holding-register convention to
//! zero-based offsets. Pure functions, no I/O.

use crate::error::{FieldError, Result};

/// MBAP header length in bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Read holding registers
pub const FC_READ_HOLDING: u8 = 0x03;
/// Write multiple registers
pub const FC_WRITE_MULTIPLE: u8 = 0x10;

/// Barrier/curtain actuation bitmask, written to the control register
pub const BARRIER_BIT_RELEASE: u16 = 0x0001;
pub const BARRIER_BIT_RUN: u16 = 0x0002;
pub const BARRIER_BIT_STOP: u16 = 0x0004;

/// Translate a 5-digit holding-register number (`40001`-based) to a 0-based offset
pub fn resolve_register_address(register: u16) -> Result<u16> {
    if register < 40001 {
        return Err(FieldError::protocol(format!(
            "Not a holding register number: {register}"
        )));
    }
    Ok(register - 40001)
}

/// Reinterpret a raw 16-bit register as a signed value (two's complement)
pub fn read_signed16(raw: u16) -> i16 {
    raw as i16
}

/// Water-level conversion: signed reinterpretation with the sensor noise
/// floor clamped at zero (gauges report small negative values when dry)
pub fn water_level(raw: u16) -> i32 {
    i32::from(read_signed16(raw)).max(0)
}

/// MBAP header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Decode the 7-byte MBAP header
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < MBAP_HEADER_LEN {
            return Err(FieldError::protocol(format!(
                "MBAP header truncated: {} bytes",
                buf.len()
            )));
        }
        let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
        if protocol_id != 0 {
            return Err(FieldError::protocol(format!(
                "Unexpected MBAP protocol id: {protocol_id}"
            )));
        }
        Ok(Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        })
    }

    /// Bytes still to read after the header (length counts the unit id)
    pub fn remaining(&self) -> Result<usize> {
        let length = self.length as usize;
        if length < 2 {
            return Err(FieldError::protocol(format!(
                "MBAP length too small: {length}"
            )));
        }
        Ok(length - 1)
    }
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    push_u16(&mut buf, transaction_id);
    push_u16(&mut buf, 0); // protocol id
    push_u16(&mut buf, (pdu.len() + 1) as u16);
    buf.push(unit_id);
    buf.extend_from_slice(pdu);
    buf
}

/// Encode an FC 0x03 read-holding-registers request
pub fn encode_read_holding(
    transaction_id: u16,
    unit_id: u8,
    offset: u16,
    quantity: u16,
) -> Result<Vec<u8>> {
    if quantity == 0 || quantity > 125 {
        return Err(FieldError::protocol(format!(
            "Read quantity out of range: {quantity}"
        )));
    }
    let mut pdu = Vec::with_capacity(5);
    pdu.push(FC_READ_HOLDING);
    push_u16(&mut pdu, offset);
    push_u16(&mut pdu, quantity);
    Ok(frame(transaction_id, unit_id, &pdu))
}

/// Encode an FC 0x10 write-multiple-registers request
pub fn encode_write_multiple(
    transaction_id: u16,
    unit_id: u8,
    offset: u16,
    values: &[u16],
) -> Result<Vec<u8>> {
    if values.is_empty() || values.len() > 123 {
        return Err(FieldError::protocol(format!(
            "Write quantity out of range: {}",
            values.len()
        )));
    }
    let mut pdu = Vec::with_capacity(6 + values.len() * 2);
    pdu.push(FC_WRITE_MULTIPLE);
    push_u16(&mut pdu, offset);
    push_u16(&mut pdu, values.len() as u16);
    pdu.push((values.len() * 2) as u8);
    for value in values {
        push_u16(&mut pdu, *value);
    }
    Ok(frame(transaction_id, unit_id, &pdu))
}

fn check_exception(pdu: &[u8], expected_fc: u8) -> Result<()> {
    let fc = pdu
        .first()
        .ok_or_else(|| FieldError::protocol("Empty PDU"))?;
    if fc & 0x80 != 0 {
        let exception = pdu.get(1).copied().unwrap_or(0);
        return Err(FieldError::protocol(format!(
            "Modbus exception {exception:#04x} for FC {:#04x} ({})",
            fc & 0x7F,
            exception_description(exception)
        )));
    }
    if *fc != expected_fc {
        return Err(FieldError::protocol(format!(
            "Unexpected function code: got {fc:#04x}, expected {expected_fc:#04x}"
        )));
    }
    Ok(())
}

fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "slave device failure",
        0x06 => "slave device busy",
        _ => "unknown exception",
    }
}

/// Decode the PDU of an FC 0x03 response into register values
pub fn decode_read_holding_response(pdu: &[u8], expected_quantity: u16) -> Result<Vec<u16>> {
    check_exception(pdu, FC_READ_HOLDING)?;
    let byte_count = *pdu
        .get(1)
        .ok_or_else(|| FieldError::protocol("Read response missing byte count"))? as usize;
    let data = &pdu[2..];
    if data.len() != byte_count || byte_count != expected_quantity as usize * 2 {
        return Err(FieldError::protocol(format!(
            "Read response size mismatch: byte_count={byte_count}, data={}, expected {} registers",
            data.len(),
            expected_quantity
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode the PDU of an FC 0x10 acknowledgment
pub fn decode_write_multiple_response(pdu: &[u8], offset: u16, quantity: u16) -> Result<()> {
    check_exception(pdu, FC_WRITE_MULTIPLE)?;
    if pdu.len() < 5 {
        return Err(FieldError::protocol(format!(
            "Write ack truncated: {} bytes",
            pdu.len()
        )));
    }
    let ack_offset = u16::from_be_bytes([pdu[1], pdu[2]]);
    let ack_quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    if ack_offset != offset || ack_quantity != quantity {
        return Err(FieldError::protocol(format!(
            "Write ack mismatch: offset {ack_offset} quantity {ack_quantity}, sent {offset}/{quantity}"
        )));
    }
    Ok(())
}

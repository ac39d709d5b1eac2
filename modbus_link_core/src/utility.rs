//! Checksums and the hex helpers used by the ASCII framing and frame logging.

use crc::{Crc, CRC_16_MODBUS};

use crate::error::ModbusError;

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Modbus CRC16 (reflected 0xA001, init 0xFFFF) in wire order: low byte first.
#[must_use]
pub fn calculate_crc(data: &[u8]) -> [u8; 2] {
    CRC_MODBUS.checksum(data).to_le_bytes()
}

/// Longitudinal redundancy check: two's complement of the byte sum.
#[must_use]
pub fn calculate_lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

/// Upper-case hex without separators, as carried by ASCII frames.
#[must_use]
pub fn get_ascii_bytes(data: &[u8]) -> Vec<u8> {
    hex::encode_upper(data).into_bytes()
}

/// Decode an ASCII-frame hex body (either case).
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, ModbusError> {
    hex::decode(hex_str)
        .map_err(|e| ModbusError::format(format!("invalid hex in ascii frame: {e}"), hex_str.len()))
}

pub(crate) fn hex_dump(b: &[u8]) -> String {
    b.iter()
        .map(|x| format!("{x:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Big-endian u16 at `offset`. Callers check the length first.
pub(crate) fn be_u16(frame: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([frame[offset], frame[offset + 1]])
}

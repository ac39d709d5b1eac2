use std::fmt;

use super::{message_header_accessors, FromFrame, MessageHeader, ModbusMessage, ModbusRequest};
use crate::error::ModbusError;
use crate::modbus_define::{COIL_OFF, COIL_ON, WRITE_SINGLE_COIL, WRITE_SINGLE_REGISTER};
use crate::utility::be_u16;

fn echo_mismatch() -> ModbusError {
    ModbusError::io("Response did not match request.")
}

/// Write single coil (5). The reply echoes the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSingleCoilRequestResponse {
    header: MessageHeader,
    pub start_address: u16,
    pub value: bool,
}

impl WriteSingleCoilRequestResponse {
    #[must_use]
    pub const fn new(slave_address: u8, start_address: u16, value: bool) -> Self {
        Self {
            header: MessageHeader::new(slave_address, WRITE_SINGLE_COIL),
            start_address,
            value,
        }
    }
}

impl ModbusMessage for WriteSingleCoilRequestResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let raw = if self.value { COIL_ON } else { COIL_OFF };
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&raw.to_be_bytes());
        pdu
    }
}

impl FromFrame for WriteSingleCoilRequestResponse {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let value = match be_u16(frame, 4) {
            COIL_ON => true,
            COIL_OFF => false,
            other => {
                return Err(ModbusError::IllegalDataValue(format!(
                    "coil value must be 0xFF00 or 0x0000, got 0x{other:04X}"
                )))
            }
        };
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            start_address: be_u16(frame, 2),
            value,
        })
    }
}

impl ModbusRequest for WriteSingleCoilRequestResponse {
    type Response = Self;

    fn validate_response(&self, response: &Self) -> Result<(), ModbusError> {
        if self.start_address != response.start_address || self.value != response.value {
            return Err(echo_mismatch());
        }
        Ok(())
    }
}

impl fmt::Display for WriteSingleCoilRequestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write single coil {} at address {}.",
            u8::from(self.value),
            self.start_address
        )
    }
}

/// Write single holding register (6). The reply echoes the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSingleRegisterRequestResponse {
    header: MessageHeader,
    pub start_address: u16,
    pub value: u16,
}

impl WriteSingleRegisterRequestResponse {
    #[must_use]
    pub const fn new(slave_address: u8, start_address: u16, value: u16) -> Self {
        Self {
            header: MessageHeader::new(slave_address, WRITE_SINGLE_REGISTER),
            start_address,
            value,
        }
    }
}

impl ModbusMessage for WriteSingleRegisterRequestResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&self.value.to_be_bytes());
        pdu
    }
}

impl FromFrame for WriteSingleRegisterRequestResponse {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            start_address: be_u16(frame, 2),
            value: be_u16(frame, 4),
        })
    }
}

impl ModbusRequest for WriteSingleRegisterRequestResponse {
    type Response = Self;

    fn validate_response(&self, response: &Self) -> Result<(), ModbusError> {
        if self.start_address != response.start_address || self.value != response.value {
            return Err(echo_mismatch());
        }
        Ok(())
    }
}

impl fmt::Display for WriteSingleRegisterRequestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write single holding register {} at address {}.",
            self.value, self.start_address
        )
    }
}

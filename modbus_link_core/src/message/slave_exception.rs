use std::fmt;

use super::{message_header_accessors, FromFrame, MessageHeader, ModbusMessage};
use crate::error::ModbusError;
use crate::exception_codes::{self, SlaveExceptionCode};
use crate::modbus_define::EXCEPTION_OFFSET;

/// Negative response: `[address][function code + 0x80][exception code]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveExceptionResponse {
    header: MessageHeader,
    slave_exception_code: u8,
}

impl SlaveExceptionResponse {
    /// `function_code` is the exception function code, i.e. already offset by 0x80.
    pub fn new(
        slave_address: u8,
        function_code: u8,
        slave_exception_code: u8,
    ) -> Result<Self, ModbusError> {
        if function_code <= EXCEPTION_OFFSET {
            return Err(ModbusError::Range(format!(
                "exception function code must be greater than {EXCEPTION_OFFSET}, got {function_code}"
            )));
        }
        Ok(Self {
            header: MessageHeader::new(slave_address, function_code),
            slave_exception_code,
        })
    }

    /// Exception reply to a request carrying `request_function_code`.
    #[must_use]
    pub fn for_request(slave_address: u8, request_function_code: u8, code: SlaveExceptionCode) -> Self {
        Self {
            header: MessageHeader::new(slave_address, request_function_code | EXCEPTION_OFFSET),
            slave_exception_code: code.code(),
        }
    }

    #[must_use]
    pub const fn slave_exception_code(&self) -> u8 {
        self.slave_exception_code
    }

    /// Function code of the request this answers.
    #[must_use]
    pub const fn request_function_code(&self) -> u8 {
        self.header.function_code - EXCEPTION_OFFSET
    }

    #[must_use]
    pub const fn exception(&self) -> Option<SlaveExceptionCode> {
        SlaveExceptionCode::from_code(self.slave_exception_code)
    }
}

impl ModbusMessage for SlaveExceptionResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        vec![self.header.function_code, self.slave_exception_code]
    }
}

impl FromFrame for SlaveExceptionResponse {
    const MINIMUM_FRAME_SIZE: usize = 3;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        if frame[1] <= EXCEPTION_OFFSET {
            return Err(ModbusError::format(
                "invalid function code value for slave exception response",
                frame.len(),
            ));
        }
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            slave_exception_code: frame[2],
        })
    }
}

impl fmt::Display for SlaveExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = exception_codes::code_description(self.slave_exception_code).unwrap_or_default();
        write!(
            f,
            "Function Code: {}\nException Code: {} - {}",
            self.header.function_code, self.slave_exception_code, desc
        )
    }
}

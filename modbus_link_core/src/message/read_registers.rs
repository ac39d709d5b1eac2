use std::fmt;

use super::{
    check_byte_count, check_points, message_header_accessors, mismatch, FromFrame, MessageHeader,
    ModbusMessage, ModbusRequest,
};
use crate::collections::RegisterCollection;
use crate::error::ModbusError;
use crate::modbus_define::{MAX_REGISTER_REQUEST_RESPONSE_SIZE, READ_INPUT_REGISTERS};
use crate::utility::be_u16;

fn register_kind(function_code: u8) -> &'static str {
    if function_code == READ_INPUT_REGISTERS {
        "input"
    } else {
        "holding"
    }
}

/// Read holding registers (3) or input registers (4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadHoldingInputRegistersRequest {
    header: MessageHeader,
    pub start_address: u16,
    pub number_of_points: u16,
}

impl ReadHoldingInputRegistersRequest {
    pub fn new(
        function_code: u8,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Self, ModbusError> {
        check_points(
            usize::from(number_of_points),
            MAX_REGISTER_REQUEST_RESPONSE_SIZE,
            "registers",
        )?;
        Ok(Self {
            header: MessageHeader::new(slave_address, function_code),
            start_address,
            number_of_points,
        })
    }
}

impl ModbusMessage for ReadHoldingInputRegistersRequest {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&self.number_of_points.to_be_bytes());
        pdu
    }
}

impl FromFrame for ReadHoldingInputRegistersRequest {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let h = MessageHeader::from_frame(frame);
        Self::new(h.function_code, h.slave_address, be_u16(frame, 2), be_u16(frame, 4))
    }
}

impl ModbusRequest for ReadHoldingInputRegistersRequest {
    type Response = ReadHoldingInputRegistersResponse;

    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError> {
        let expected = usize::from(self.number_of_points) * 2;
        if response.byte_count() != expected {
            return Err(mismatch("byte count", expected, response.byte_count()));
        }
        Ok(())
    }
}

impl fmt::Display for ReadHoldingInputRegistersRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} {} registers starting at address {}.",
            self.number_of_points,
            register_kind(self.header.function_code),
            self.start_address
        )
    }
}

/// Response to function 3, 4 and 23.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadHoldingInputRegistersResponse {
    header: MessageHeader,
    data: RegisterCollection,
}

impl ReadHoldingInputRegistersResponse {
    pub fn new(
        function_code: u8,
        slave_address: u8,
        data: RegisterCollection,
    ) -> Result<Self, ModbusError> {
        check_points(data.count(), MAX_REGISTER_REQUEST_RESPONSE_SIZE, "registers")?;
        Ok(Self {
            header: MessageHeader::new(slave_address, function_code),
            data,
        })
    }

    #[must_use]
    pub const fn data(&self) -> &RegisterCollection {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> RegisterCollection {
        self.data
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.data.byte_count()
    }
}

impl ModbusMessage for ReadHoldingInputRegistersResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(self.data.byte_count() + 2);
        pdu.push(self.header.function_code);
        pdu.push(u8::try_from(self.data.byte_count()).unwrap_or(u8::MAX));
        pdu.extend_from_slice(&self.data.network_bytes());
        pdu
    }
}

impl FromFrame for ReadHoldingInputRegistersResponse {
    const MINIMUM_FRAME_SIZE: usize = 3;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let byte_count = usize::from(frame[2]);
        check_byte_count(frame, 3, byte_count)?;
        let data = RegisterCollection::from_bytes(&frame[3..3 + byte_count])
            .map_err(|_| ModbusError::format("odd register byte count", frame.len()))?;
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            data,
        })
    }
}

impl fmt::Display for ReadHoldingInputRegistersResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} {} registers.",
            self.data.count(),
            register_kind(self.header.function_code)
        )
    }
}

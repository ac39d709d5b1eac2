use std::fmt;

use super::{
    check_byte_count, check_points, message_header_accessors, mismatch, FromFrame, MessageHeader,
    ModbusMessage, ModbusRequest,
};
use crate::collections::DiscreteCollection;
use crate::error::ModbusError;
use crate::modbus_define::{MAX_DISCRETE_REQUEST_RESPONSE_SIZE, READ_COILS};
use crate::utility::be_u16;

fn point_kind(function_code: u8) -> &'static str {
    if function_code == READ_COILS {
        "coils"
    } else {
        "inputs"
    }
}

/// Read coils (1) or discrete inputs (2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCoilsInputsRequest {
    header: MessageHeader,
    pub start_address: u16,
    pub number_of_points: u16,
}

impl ReadCoilsInputsRequest {
    pub fn new(
        function_code: u8,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Self, ModbusError> {
        check_points(
            usize::from(number_of_points),
            MAX_DISCRETE_REQUEST_RESPONSE_SIZE,
            "discretes",
        )?;
        Ok(Self {
            header: MessageHeader::new(slave_address, function_code),
            start_address,
            number_of_points,
        })
    }
}

impl ModbusMessage for ReadCoilsInputsRequest {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&self.number_of_points.to_be_bytes());
        pdu
    }
}

impl FromFrame for ReadCoilsInputsRequest {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let h = MessageHeader::from_frame(frame);
        Self::new(h.function_code, h.slave_address, be_u16(frame, 2), be_u16(frame, 4))
    }
}

impl ModbusRequest for ReadCoilsInputsRequest {
    type Response = ReadCoilsInputsResponse;

    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError> {
        let expected = usize::from(self.number_of_points).div_ceil(8);
        if response.byte_count() != expected {
            return Err(mismatch("byte count", expected, response.byte_count()));
        }
        Ok(())
    }
}

impl fmt::Display for ReadCoilsInputsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} {} starting at address {}.",
            self.number_of_points,
            point_kind(self.header.function_code),
            self.start_address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCoilsInputsResponse {
    header: MessageHeader,
    data: DiscreteCollection,
}

impl ReadCoilsInputsResponse {
    pub fn new(
        function_code: u8,
        slave_address: u8,
        data: DiscreteCollection,
    ) -> Result<Self, ModbusError> {
        check_points(data.count(), MAX_DISCRETE_REQUEST_RESPONSE_SIZE, "discretes")?;
        Ok(Self {
            header: MessageHeader::new(slave_address, function_code),
            data,
        })
    }

    /// Decoded values; a decoded response holds whole bytes, so padding bits are included.
    #[must_use]
    pub const fn data(&self) -> &DiscreteCollection {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> DiscreteCollection {
        self.data
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.data.byte_count()
    }
}

impl ModbusMessage for ReadCoilsInputsResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let bytes = self.data.network_bytes();
        let mut pdu = Vec::with_capacity(bytes.len() + 2);
        pdu.push(self.header.function_code);
        // bounded by MAX_DISCRETE_REQUEST_RESPONSE_SIZE / 8
        pdu.push(u8::try_from(bytes.len()).unwrap_or(u8::MAX));
        pdu.extend_from_slice(&bytes);
        pdu
    }
}

impl FromFrame for ReadCoilsInputsResponse {
    const MINIMUM_FRAME_SIZE: usize = 3;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let byte_count = usize::from(frame[2]);
        check_byte_count(frame, 3, byte_count)?;
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            data: DiscreteCollection::from_bytes(&frame[3..3 + byte_count]),
        })
    }
}

impl fmt::Display for ReadCoilsInputsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} {} - {}.",
            self.data.count(),
            point_kind(self.header.function_code),
            self.data
        )
    }
}

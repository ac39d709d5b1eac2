use std::fmt;

use super::{
    check_byte_count, message_header_accessors, mismatch, FromFrame, MessageHeader,
    ModbusMessage, ModbusRequest, ReadHoldingInputRegistersRequest,
    ReadHoldingInputRegistersResponse, WriteMultipleRegistersRequest,
};
use crate::collections::RegisterCollection;
use crate::error::ModbusError;
use crate::modbus_define::{READ_HOLDING_REGISTERS, READ_WRITE_MULTIPLE_REGISTERS};
use crate::utility::be_u16;

/// Read/write multiple registers (23): the write is performed before the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadWriteMultipleRegistersRequest {
    header: MessageHeader,
    read_request: ReadHoldingInputRegistersRequest,
    write_request: WriteMultipleRegistersRequest,
}

impl ReadWriteMultipleRegistersRequest {
    pub fn new(
        slave_address: u8,
        start_read_address: u16,
        number_of_points_to_read: u16,
        start_write_address: u16,
        write_data: RegisterCollection,
    ) -> Result<Self, ModbusError> {
        Ok(Self {
            header: MessageHeader::new(slave_address, READ_WRITE_MULTIPLE_REGISTERS),
            read_request: ReadHoldingInputRegistersRequest::new(
                READ_HOLDING_REGISTERS,
                slave_address,
                start_read_address,
                number_of_points_to_read,
            )?,
            write_request: WriteMultipleRegistersRequest::new(
                slave_address,
                start_write_address,
                write_data,
            )?,
        })
    }

    #[must_use]
    pub const fn read_request(&self) -> &ReadHoldingInputRegistersRequest {
        &self.read_request
    }

    #[must_use]
    pub const fn write_request(&self) -> &WriteMultipleRegistersRequest {
        &self.write_request
    }
}

impl ModbusMessage for ReadWriteMultipleRegistersRequest {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        // read start/count, then the write block without its function code
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.read_request.protocol_data_unit()[1..]);
        pdu.extend_from_slice(&self.write_request.protocol_data_unit()[1..]);
        pdu
    }
}

impl FromFrame for ReadWriteMultipleRegistersRequest {
    const MINIMUM_FRAME_SIZE: usize = 11;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let write_points = usize::from(be_u16(frame, 8));
        let byte_count = usize::from(frame[10]);
        check_byte_count(frame, 11, byte_count)?;
        if byte_count != write_points * 2 {
            return Err(ModbusError::format(
                format!("byte count {byte_count} does not match {write_points} write registers"),
                frame.len(),
            ));
        }
        let write_data = RegisterCollection::from_bytes(&frame[11..11 + byte_count])?;
        let mut req = Self::new(
            frame[0],
            be_u16(frame, 2),
            be_u16(frame, 4),
            be_u16(frame, 6),
            write_data,
        )?;
        req.header.function_code = frame[1];
        Ok(req)
    }
}

impl ModbusRequest for ReadWriteMultipleRegistersRequest {
    type Response = ReadHoldingInputRegistersResponse;

    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError> {
        let expected = usize::from(self.read_request.number_of_points) * 2;
        if response.byte_count() != expected {
            return Err(mismatch("byte count", expected, response.byte_count()));
        }
        Ok(())
    }
}

impl fmt::Display for ReadWriteMultipleRegistersRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write {} holding registers starting at address {}, and read {} registers starting at address {}.",
            self.write_request.number_of_points(),
            self.write_request.start_address,
            self.read_request.number_of_points,
            self.read_request.start_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::create_modbus_message;

    fn sample() -> ReadWriteMultipleRegistersRequest {
        ReadWriteMultipleRegistersRequest::new(
            5,
            3,
            6,
            14,
            RegisterCollection::from_values(vec![255, 255, 255]),
        )
        .expect("request")
    }

    #[test]
    fn pdu_layout() {
        assert_eq!(
            sample().protocol_data_unit(),
            vec![0x17, 0, 3, 0, 6, 0, 0x0e, 0, 3, 6, 0, 0xff, 0, 0xff, 0, 0xff]
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            sample().to_string(),
            "Write 3 holding registers starting at address 14, and read 6 registers starting at address 3."
        );
    }

    #[test]
    fn decode() {
        let frame = sample().message_frame();
        let req = create_modbus_message::<ReadWriteMultipleRegistersRequest>(&frame)
            .expect("decode");
        assert_eq!(req.read_request().start_address, 3);
        assert_eq!(req.write_request().data().as_slice(), &[255, 255, 255]);
    }

    #[test]
    fn decode_byte_count_mismatch() {
        let mut frame = sample().message_frame();
        frame[10] = 4;
        assert!(matches!(
            create_modbus_message::<ReadWriteMultipleRegistersRequest>(&frame),
            Err(ModbusError::Format { .. })
        ));
        assert!(matches!(
            create_modbus_message::<ReadWriteMultipleRegistersRequest>(&frame[..10]),
            Err(ModbusError::Format { frame_len: 10, .. })
        ));
    }

    #[test]
    fn read_count_limit() {
        assert!(ReadWriteMultipleRegistersRequest::new(1, 0, 126, 0, vec![1u16].into()).is_err());
    }

    #[test]
    fn round_trip_every_count() {
        use crate::modbus_define::MAX_REGISTER_REQUEST_RESPONSE_SIZE;

        for n in 0..=MAX_REGISTER_REQUEST_RESPONSE_SIZE {
            let count = u16::try_from(n).expect("count");
            let writes: Vec<u16> = (0..count).map(|i| i ^ 0x5A5A).collect();
            let req = ReadWriteMultipleRegistersRequest::new(2, 10, count, 200, writes.into())
                .expect("req");
            let back =
                create_modbus_message::<ReadWriteMultipleRegistersRequest>(&req.message_frame())
                    .expect("decode");
            assert_eq!(back, req, "n = {n}");
        }
    }
}

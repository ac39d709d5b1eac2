use std::fmt;

use super::{
    check_byte_count, check_points, message_header_accessors, mismatch, FromFrame, MessageHeader,
    ModbusMessage, ModbusRequest,
};
use crate::collections::{DiscreteCollection, RegisterCollection};
use crate::error::ModbusError;
use crate::modbus_define::{
    MAX_DISCRETE_REQUEST_RESPONSE_SIZE, MAX_REGISTER_REQUEST_RESPONSE_SIZE, WRITE_MULTIPLE_COILS,
    WRITE_MULTIPLE_REGISTERS,
};
use crate::utility::be_u16;

fn count_u16(n: usize) -> u16 {
    // callers bound n by the protocol maxima
    u16::try_from(n).unwrap_or(u16::MAX)
}

fn count_u8(n: usize) -> u8 {
    u8::try_from(n).unwrap_or(u8::MAX)
}

/// Shared layout of both write-multiple requests: start, count, byte count, data.
fn write_multiple_pdu(function_code: u8, start: u16, points: usize, bytes: &[u8]) -> Vec<u8> {
    let mut pdu = Vec::with_capacity(6 + bytes.len());
    pdu.push(function_code);
    pdu.extend_from_slice(&start.to_be_bytes());
    pdu.extend_from_slice(&count_u16(points).to_be_bytes());
    pdu.push(count_u8(bytes.len()));
    pdu.extend_from_slice(bytes);
    pdu
}

/// Validate start/count/byte-count of an inbound write-multiple frame and return `(start, points, data bytes)`.
fn decode_write_multiple(
    frame: &[u8],
    expected_byte_count: fn(usize) -> usize,
) -> Result<(u16, usize, &[u8]), ModbusError> {
    let start = be_u16(frame, 2);
    let points = usize::from(be_u16(frame, 4));
    let byte_count = usize::from(frame[6]);
    check_byte_count(frame, 7, byte_count)?;
    if byte_count != expected_byte_count(points) {
        return Err(ModbusError::format(
            format!(
                "byte count {byte_count} does not match {points} points (expected {})",
                expected_byte_count(points)
            ),
            frame.len(),
        ));
    }
    Ok((start, points, &frame[7..7 + byte_count]))
}

/// Write multiple coils (15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest {
    header: MessageHeader,
    pub start_address: u16,
    data: DiscreteCollection,
}

impl WriteMultipleCoilsRequest {
    pub fn new(
        slave_address: u8,
        start_address: u16,
        data: DiscreteCollection,
    ) -> Result<Self, ModbusError> {
        check_points(data.count(), MAX_DISCRETE_REQUEST_RESPONSE_SIZE, "discretes")?;
        Ok(Self {
            header: MessageHeader::new(slave_address, WRITE_MULTIPLE_COILS),
            start_address,
            data,
        })
    }

    #[must_use]
    pub const fn data(&self) -> &DiscreteCollection {
        &self.data
    }

    #[must_use]
    pub fn number_of_points(&self) -> usize {
        self.data.count()
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.data.byte_count()
    }
}

impl ModbusMessage for WriteMultipleCoilsRequest {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        write_multiple_pdu(
            self.header.function_code,
            self.start_address,
            self.data.count(),
            &self.data.network_bytes(),
        )
    }
}

impl FromFrame for WriteMultipleCoilsRequest {
    const MINIMUM_FRAME_SIZE: usize = 7;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let (start, points, bytes) = decode_write_multiple(frame, |n| n.div_ceil(8))?;
        let mut data = DiscreteCollection::from_bytes(bytes);
        data.truncate(points);
        let mut req = Self::new(frame[0], start, data)?;
        req.header.function_code = frame[1];
        Ok(req)
    }
}

impl ModbusRequest for WriteMultipleCoilsRequest {
    type Response = WriteMultipleCoilsResponse;

    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError> {
        if response.start_address != self.start_address {
            return Err(mismatch("start address", self.start_address, response.start_address));
        }
        if usize::from(response.number_of_points) != self.number_of_points() {
            return Err(mismatch(
                "number of points",
                self.number_of_points(),
                response.number_of_points,
            ));
        }
        Ok(())
    }
}

impl fmt::Display for WriteMultipleCoilsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write {} coils starting at address {}.",
            self.data.count(),
            self.start_address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleCoilsResponse {
    header: MessageHeader,
    pub start_address: u16,
    pub number_of_points: u16,
}

impl WriteMultipleCoilsResponse {
    pub fn new(
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
            header: MessageHeader::new(slave_address, WRITE_MULTIPLE_COILS),
            start_address,
            number_of_points,
        })
    }
}

impl ModbusMessage for WriteMultipleCoilsResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&self.number_of_points.to_be_bytes());
        pdu
    }
}

impl FromFrame for WriteMultipleCoilsResponse {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let mut resp = Self::new(frame[0], be_u16(frame, 2), be_u16(frame, 4))?;
        resp.header.function_code = frame[1];
        Ok(resp)
    }
}

impl fmt::Display for WriteMultipleCoilsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wrote {} coils starting at address {}.",
            self.number_of_points, self.start_address
        )
    }
}

/// Write multiple holding registers (16).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest {
    header: MessageHeader,
    pub start_address: u16,
    data: RegisterCollection,
}

impl WriteMultipleRegistersRequest {
    pub fn new(
        slave_address: u8,
        start_address: u16,
        data: RegisterCollection,
    ) -> Result<Self, ModbusError> {
        check_points(data.count(), MAX_REGISTER_REQUEST_RESPONSE_SIZE, "registers")?;
        Ok(Self {
            header: MessageHeader::new(slave_address, WRITE_MULTIPLE_REGISTERS),
            start_address,
            data,
        })
    }

    #[must_use]
    pub const fn data(&self) -> &RegisterCollection {
        &self.data
    }

    #[must_use]
    pub fn number_of_points(&self) -> usize {
        self.data.count()
    }

    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.data.byte_count()
    }
}

impl ModbusMessage for WriteMultipleRegistersRequest {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        write_multiple_pdu(
            self.header.function_code,
            self.start_address,
            self.data.count(),
            &self.data.network_bytes(),
        )
    }
}

impl FromFrame for WriteMultipleRegistersRequest {
    const MINIMUM_FRAME_SIZE: usize = 7;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let (start, _points, bytes) = decode_write_multiple(frame, |n| n * 2)?;
        let data = RegisterCollection::from_bytes(bytes)?;
        let mut req = Self::new(frame[0], start, data)?;
        req.header.function_code = frame[1];
        Ok(req)
    }
}

impl ModbusRequest for WriteMultipleRegistersRequest {
    type Response = WriteMultipleRegistersResponse;

    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError> {
        if response.start_address != self.start_address {
            return Err(mismatch("start address", self.start_address, response.start_address));
        }
        if usize::from(response.number_of_points) != self.number_of_points() {
            return Err(mismatch(
                "number of points",
                self.number_of_points(),
                response.number_of_points,
            ));
        }
        Ok(())
    }
}

impl fmt::Display for WriteMultipleRegistersRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Write {} holding registers starting at address {}.",
            self.data.count(),
            self.start_address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleRegistersResponse {
    header: MessageHeader,
    pub start_address: u16,
    pub number_of_points: u16,
}

impl WriteMultipleRegistersResponse {
    pub fn new(
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
            header: MessageHeader::new(slave_address, WRITE_MULTIPLE_REGISTERS),
            start_address,
            number_of_points,
        })
    }
}

impl ModbusMessage for WriteMultipleRegistersResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.start_address.to_be_bytes());
        pdu.extend_from_slice(&self.number_of_points.to_be_bytes());
        pdu
    }
}

impl FromFrame for WriteMultipleRegistersResponse {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let mut resp = Self::new(frame[0], be_u16(frame, 2), be_u16(frame, 4))?;
        resp.header.function_code = frame[1];
        Ok(resp)
    }
}

impl fmt::Display for WriteMultipleRegistersResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wrote {} holding registers starting at address {}.",
            self.number_of_points, self.start_address
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::create_modbus_message;

    #[test]
    fn coils_request_decode() {
        let req = create_modbus_message::<WriteMultipleCoilsRequest>(&[
            17, 15, 0, 19, 0, 10, 2, 205, 1,
        ])
        .expect("decode");
        assert_eq!(req.start_address, 19);
        assert_eq!(req.number_of_points(), 10);
        assert_eq!(req.byte_count(), 2);
        assert_eq!(
            req.data().as_slice(),
            &[true, false, true, true, false, false, true, true, true, false]
        );
        assert_eq!(req.protocol_data_unit(), vec![15, 0, 19, 0, 10, 2, 205, 1]);
    }

    #[test]
    fn coils_byte_count_must_match_points() {
        // 10 points need 2 bytes, frame claims 1
        assert!(matches!(
            create_modbus_message::<WriteMultipleCoilsRequest>(&[17, 15, 0, 19, 0, 10, 1, 205]),
            Err(ModbusError::Format { .. })
        ));
        // claims 2 bytes, only 1 present
        assert!(matches!(
            create_modbus_message::<WriteMultipleCoilsRequest>(&[17, 15, 0, 19, 0, 10, 2, 205]),
            Err(ModbusError::Format { frame_len: 8, .. })
        ));
    }

    #[test]
    fn coils_display() {
        let req =
            WriteMultipleCoilsRequest::new(34, 45, vec![true; 9].into()).expect("request");
        assert_eq!(req.to_string(), "Write 9 coils starting at address 45.");
        let resp = WriteMultipleCoilsResponse::new(1, 2, 3).expect("response");
        assert_eq!(resp.to_string(), "Wrote 3 coils starting at address 2.");
    }

    #[test]
    fn coils_limits() {
        assert!(WriteMultipleCoilsRequest::new(1, 0, vec![true; 2000].into()).is_ok());
        assert!(WriteMultipleCoilsRequest::new(1, 0, vec![true; 2001].into()).is_err());
        assert!(WriteMultipleCoilsResponse::new(1, 0, 2001).is_err());
    }

    #[test]
    fn registers_request_decode() {
        let req = create_modbus_message::<WriteMultipleRegistersRequest>(&[
            11, 16, 0, 5, 0, 1, 2, 255, 255,
        ])
        .expect("decode");
        assert_eq!(req.slave_address(), 11);
        assert_eq!(req.start_address, 5);
        assert_eq!(req.data().as_slice(), &[0xFFFF]);
    }

    #[test]
    fn registers_byte_count_must_be_twice_points() {
        assert!(matches!(
            create_modbus_message::<WriteMultipleRegistersRequest>(&[
                11, 16, 0, 5, 0, 2, 2, 255, 255,
            ]),
            Err(ModbusError::Format { .. })
        ));
    }

    #[test]
    fn registers_limits_and_display() {
        let max = RegisterCollection::from_values(vec![0u16; 125]);
        assert!(WriteMultipleRegistersRequest::new(1, 0, max).is_ok());
        let over = RegisterCollection::from_values(vec![0u16; 126]);
        assert!(matches!(
            WriteMultipleRegistersRequest::new(1, 0, over),
            Err(ModbusError::Range(_))
        ));
        let resp = WriteMultipleRegistersResponse::new(1, 2, 3).expect("response");
        assert_eq!(resp.to_string(), "Wrote 3 holding registers starting at address 2.");
    }

    #[test]
    fn validate_start_and_count() {
        let req = WriteMultipleRegistersRequest::new(1, 10, vec![1u16, 2].into()).expect("req");
        assert!(req
            .validate_response(&WriteMultipleRegistersResponse::new(1, 10, 2).expect("resp"))
            .is_ok());
        assert!(req
            .validate_response(&WriteMultipleRegistersResponse::new(1, 11, 2).expect("resp"))
            .is_err());
        assert!(req
            .validate_response(&WriteMultipleRegistersResponse::new(1, 10, 3).expect("resp"))
            .is_err());
    }

    #[test]
    fn round_trip_every_count() {
        for n in 0..=MAX_DISCRETE_REQUEST_RESPONSE_SIZE {
            let values: Vec<bool> = (0..n).map(|i| i % 5 < 2).collect();
            let req = WriteMultipleCoilsRequest::new(3, 8, values.into()).expect("req");
            let back = create_modbus_message::<WriteMultipleCoilsRequest>(&req.message_frame())
                .expect("decode coils request");
            assert_eq!(back, req, "coils request n = {n}");

            let count = u16::try_from(n).expect("count");
            let resp = WriteMultipleCoilsResponse::new(3, 8, count).expect("resp");
            let back = create_modbus_message::<WriteMultipleCoilsResponse>(&resp.message_frame())
                .expect("decode coils response");
            assert_eq!(back, resp, "coils response n = {n}");
        }

        for n in 0..=MAX_REGISTER_REQUEST_RESPONSE_SIZE {
            let count = u16::try_from(n).expect("count");
            let values: Vec<u16> = (0..count).map(|i| 0xFFFF - i).collect();
            let req = WriteMultipleRegistersRequest::new(3, 8, values.into()).expect("req");
            let back = create_modbus_message::<WriteMultipleRegistersRequest>(&req.message_frame())
                .expect("decode registers request");
            assert_eq!(back, req, "registers request n = {n}");

            let resp = WriteMultipleRegistersResponse::new(3, 8, count).expect("resp");
            let back =
                create_modbus_message::<WriteMultipleRegistersResponse>(&resp.message_frame())
                    .expect("decode registers response");
            assert_eq!(back, resp, "registers response n = {n}");
        }
    }
}

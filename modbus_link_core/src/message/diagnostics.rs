use std::fmt;

use super::{
    check_points, message_header_accessors, FromFrame, MessageHeader, ModbusMessage,
    ModbusRequest,
};
use crate::collections::RegisterCollection;
use crate::error::ModbusError;
use crate::modbus_define::{
    DIAGNOSTICS, DIAGNOSTICS_RETURN_QUERY_DATA, MAX_REGISTER_REQUEST_RESPONSE_SIZE,
};
use crate::utility::be_u16;

/// Diagnostics (8). Only the "return query data" sub-function is supported;
/// the reply echoes the request data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsRequestResponse {
    header: MessageHeader,
    pub sub_function_code: u16,
    pub data: RegisterCollection,
}

impl DiagnosticsRequestResponse {
    /// At least one data word is required; without it the frame is shorter
    /// than anything the decoder accepts.
    pub fn new(
        sub_function_code: u16,
        slave_address: u8,
        data: RegisterCollection,
    ) -> Result<Self, ModbusError> {
        if data.count() == 0 {
            return Err(ModbusError::Range(
                "diagnostics request needs at least one data word".to_string(),
            ));
        }
        check_points(data.count(), MAX_REGISTER_REQUEST_RESPONSE_SIZE, "registers")?;
        Ok(Self {
            header: MessageHeader::new(slave_address, DIAGNOSTICS),
            sub_function_code,
            data,
        })
    }

    pub fn return_query_data(slave_address: u8, data: RegisterCollection) -> Result<Self, ModbusError> {
        Self::new(DIAGNOSTICS_RETURN_QUERY_DATA, slave_address, data)
    }
}

impl ModbusMessage for DiagnosticsRequestResponse {
    message_header_accessors!();

    fn protocol_data_unit(&self) -> Vec<u8> {
        let mut pdu = vec![self.header.function_code];
        pdu.extend_from_slice(&self.sub_function_code.to_be_bytes());
        pdu.extend_from_slice(&self.data.network_bytes());
        pdu
    }
}

impl FromFrame for DiagnosticsRequestResponse {
    const MINIMUM_FRAME_SIZE: usize = 6;

    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError> {
        let sub_function_code = be_u16(frame, 2);
        if sub_function_code != DIAGNOSTICS_RETURN_QUERY_DATA {
            return Err(ModbusError::format(
                format!("unsupported diagnostics sub-function {sub_function_code}"),
                frame.len(),
            ));
        }
        let data = RegisterCollection::from_bytes(&frame[4..])
            .map_err(|_| ModbusError::format("odd diagnostics data length", frame.len()))?;
        Ok(Self {
            header: MessageHeader::from_frame(frame),
            sub_function_code,
            data,
        })
    }
}

impl ModbusRequest for DiagnosticsRequestResponse {
    type Response = Self;

    fn validate_response(&self, response: &Self) -> Result<(), ModbusError> {
        if self.sub_function_code != response.sub_function_code || self.data != response.data {
            return Err(ModbusError::io("Response data did not match request."));
        }
        Ok(())
    }
}

impl fmt::Display for DiagnosticsRequestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Diagnostics message, sub-function return query data - {}.",
            self.data
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::create_modbus_message;

    #[test]
    fn pdu() {
        let m = DiagnosticsRequestResponse::return_query_data(
            3,
            RegisterCollection::from_values(vec![1, 2, 3, 4]),
        )
        .expect("message");
        assert_eq!(
            m.protocol_data_unit(),
            vec![8, 0, 0, 0, 1, 0, 2, 0, 3, 0, 4]
        );
    }

    #[test]
    fn decode_and_display() {
        let m = create_modbus_message::<DiagnosticsRequestResponse>(&[10, 8, 0, 0, 0, 5])
            .expect("decode");
        assert_eq!(m.data.as_slice(), &[5]);
        assert_eq!(
            m.to_string(),
            "Diagnostics message, sub-function return query data - {5}."
        );
    }

    #[test]
    fn other_sub_function_is_format_error() {
        assert!(matches!(
            create_modbus_message::<DiagnosticsRequestResponse>(&[10, 8, 0, 1, 0, 5]),
            Err(ModbusError::Format { .. })
        ));
    }

    #[test]
    fn data_word_count_is_bounded() {
        assert!(matches!(
            DiagnosticsRequestResponse::return_query_data(1, RegisterCollection::default()),
            Err(ModbusError::Range(_))
        ));
        assert!(DiagnosticsRequestResponse::return_query_data(1, vec![0u16; 126].into()).is_err());
    }

    #[test]
    fn round_trip_every_length() {
        for n in 1..=MAX_REGISTER_REQUEST_RESPONSE_SIZE {
            let values: Vec<u16> = (0..n).map(|i| (i as u16).wrapping_mul(0x0101)).collect();
            let m = DiagnosticsRequestResponse::return_query_data(4, values.into()).expect("message");
            let back = create_modbus_message::<DiagnosticsRequestResponse>(&m.message_frame())
                .expect("decode");
            assert_eq!(back, m, "n = {n}");
        }
    }
}

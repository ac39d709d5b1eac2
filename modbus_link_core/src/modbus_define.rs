//! Protocol constants shared by the message model, services and transports.

pub const READ_COILS: u8 = 1;
pub const READ_INPUTS: u8 = 2;
pub const READ_HOLDING_REGISTERS: u8 = 3;
pub const READ_INPUT_REGISTERS: u8 = 4;
pub const WRITE_SINGLE_COIL: u8 = 5;
pub const WRITE_SINGLE_REGISTER: u8 = 6;
pub const DIAGNOSTICS: u8 = 8;
pub const WRITE_MULTIPLE_COILS: u8 = 15;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 16;
pub const READ_WRITE_MULTIPLE_REGISTERS: u8 = 23;

/// Diagnostics sub-function "return query data".
pub const DIAGNOSTICS_RETURN_QUERY_DATA: u16 = 0;

/// Added to the request function code in an exception response.
pub const EXCEPTION_OFFSET: u8 = 0x80;

pub const BROADCAST_ADDRESS: u8 = 0;

pub const MAX_DISCRETE_REQUEST_RESPONSE_SIZE: usize = 2000;
pub const MAX_REGISTER_REQUEST_RESPONSE_SIZE: usize = 125;

pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

/// RTU bytes read before asking the service for the remaining length.
pub const RTU_REQUEST_FRAME_START_LENGTH: usize = 7;
pub const RTU_RESPONSE_FRAME_START_LENGTH: usize = 4;

/// MBAP header bytes preceding the unit id.
pub const MBAP_HEADER_LENGTH: usize = 6;
pub const MBAP_PROTOCOL_ID: u16 = 0;

pub const ASCII_START: u8 = b':';
pub const NEW_LINE: &str = "\r\n";

/// Largest PDU the message model builds: a function 23 request writing 125
/// registers (function code, four u16 fields, byte count, 250 data bytes).
pub const MAX_PDU_LEN: usize = 10 + 2 * MAX_REGISTER_REQUEST_RESPONSE_SIZE;
/// Largest MBAP length field: unit id plus PDU.
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_LEN;
/// Largest serial ADU: address, PDU and a two-byte CRC.
pub const MAX_FRAME_LEN: usize = 1 + MAX_PDU_LEN + 2;

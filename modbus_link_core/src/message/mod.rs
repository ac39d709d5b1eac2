//! Modbus message model.
//!
//! Every request/response kind is its own struct implementing [`ModbusMessage`]
//! (field access, PDU and frame encoding) and [`FromFrame`] (decode from
//! `address + PDU`). The closed set is wrapped by [`Message`] for the slave
//! side, where the kind is only known after looking at the function code.
//! Requests additionally implement [`ModbusRequest`], which ties each request
//! to its response type and validates a decoded reply.

use std::fmt;

use crate::error::ModbusError;
use crate::exception_codes;
use crate::modbus_define::EXCEPTION_OFFSET;

/// Implements the header accessors for a struct with a `header: MessageHeader` field.
macro_rules! message_header_accessors {
    () => {
        fn header(&self) -> &$crate::message::MessageHeader {
            &self.header
        }
        fn header_mut(&mut self) -> &mut $crate::message::MessageHeader {
            &mut self.header
        }
    };
}
pub(crate) use message_header_accessors;

mod diagnostics;
mod read_coils_inputs;
mod read_registers;
mod read_write_registers;
mod slave_exception;
mod write_multiple;
mod write_single;

pub use diagnostics::DiagnosticsRequestResponse;
pub use read_coils_inputs::{ReadCoilsInputsRequest, ReadCoilsInputsResponse};
pub use read_registers::{ReadHoldingInputRegistersRequest, ReadHoldingInputRegistersResponse};
pub use read_write_registers::ReadWriteMultipleRegistersRequest;
pub use slave_exception::SlaveExceptionResponse;
pub use write_multiple::{
    WriteMultipleCoilsRequest, WriteMultipleCoilsResponse, WriteMultipleRegistersRequest,
    WriteMultipleRegistersResponse,
};
pub use write_single::{WriteSingleCoilRequestResponse, WriteSingleRegisterRequestResponse};

/// Fields every message carries besides its PDU body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub slave_address: u8,
    pub function_code: u8,
    /// Only meaningful on IP transports.
    pub transaction_id: u16,
}

impl MessageHeader {
    #[must_use]
    pub const fn new(slave_address: u8, function_code: u8) -> Self {
        Self {
            slave_address,
            function_code,
            transaction_id: 0,
        }
    }

    /// Address and function code from the first two frame bytes.
    /// Callers have already checked the minimum frame size.
    pub(crate) const fn from_frame(frame: &[u8]) -> Self {
        Self::new(frame[0], frame[1])
    }
}

pub trait ModbusMessage: fmt::Display + fmt::Debug + Send + Sync {
    fn header(&self) -> &MessageHeader;
    fn header_mut(&mut self) -> &mut MessageHeader;

    /// Function code followed by the function-specific fields.
    fn protocol_data_unit(&self) -> Vec<u8>;

    fn slave_address(&self) -> u8 {
        self.header().slave_address
    }
    fn function_code(&self) -> u8 {
        self.header().function_code
    }
    fn transaction_id(&self) -> u16 {
        self.header().transaction_id
    }
    fn set_transaction_id(&mut self, transaction_id: u16) {
        self.header_mut().transaction_id = transaction_id;
    }

    /// Slave address followed by the PDU.
    fn message_frame(&self) -> Vec<u8> {
        let pdu = self.protocol_data_unit();
        let mut frame = Vec::with_capacity(pdu.len() + 1);
        frame.push(self.slave_address());
        frame.extend_from_slice(&pdu);
        frame
    }
}

/// Decode from a message frame (`address + PDU`, no checksum or MBAP header).
pub trait FromFrame: Sized {
    const MINIMUM_FRAME_SIZE: usize;

    /// Extract the kind-specific fields. The frame is at least `MINIMUM_FRAME_SIZE` long.
    fn initialize_unique(frame: &[u8]) -> Result<Self, ModbusError>;
}

/// A request issued by a master, paired with the response kind it expects.
pub trait ModbusRequest: ModbusMessage {
    type Response: ModbusMessage + FromFrame;

    /// Request-specific consistency check of a decoded reply.
    fn validate_response(&self, response: &Self::Response) -> Result<(), ModbusError>;
}

/// Allocate and decode a `T` from a raw frame; decode errors are returned unchanged.
pub fn create_modbus_message<T: FromFrame>(frame: &[u8]) -> Result<T, ModbusError> {
    if frame.len() < T::MINIMUM_FRAME_SIZE {
        return Err(ModbusError::format(
            format!(
                "message frame must contain at least {} bytes of data",
                T::MINIMUM_FRAME_SIZE
            ),
            frame.len(),
        ));
    }
    T::initialize_unique(frame)
}

/// Reply to a unicast request: the expected kind, or a slave exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<T> {
    Data(T),
    Exception(SlaveExceptionResponse),
}

impl<T> Response<T> {
    /// Decode `frame` as an exception when its function code carries the exception bit.
    pub fn from_frame(frame: &[u8]) -> Result<Self, ModbusError>
    where
        T: FromFrame,
    {
        if frame.len() >= 2 && frame[1] > EXCEPTION_OFFSET {
            return create_modbus_message(frame).map(Self::Exception);
        }
        create_modbus_message(frame).map(Self::Data)
    }

    /// Turn an exception reply into `ModbusError::SlaveException`.
    pub fn into_result(self) -> Result<T, ModbusError> {
        match self {
            Self::Data(t) => Ok(t),
            Self::Exception(e) => Err(e.into_error()),
        }
    }
}

impl<T: ModbusMessage> Response<T> {
    #[must_use]
    pub fn as_message(&self) -> &dyn ModbusMessage {
        match self {
            Self::Data(t) => t,
            Self::Exception(e) => e,
        }
    }

    pub fn as_message_mut(&mut self) -> &mut dyn ModbusMessage {
        match self {
            Self::Data(t) => t,
            Self::Exception(e) => e,
        }
    }
}

impl SlaveExceptionResponse {
    #[must_use]
    pub fn into_error(self) -> ModbusError {
        let code = self.slave_exception_code();
        ModbusError::SlaveException {
            function_code: self.function_code(),
            exception_code: code,
            description: exception_codes::code_description(code).unwrap_or_default(),
        }
    }
}

/// Closed set of every message kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ReadCoilsInputsRequest(ReadCoilsInputsRequest),
    ReadCoilsInputsResponse(ReadCoilsInputsResponse),
    ReadHoldingInputRegistersRequest(ReadHoldingInputRegistersRequest),
    ReadHoldingInputRegistersResponse(ReadHoldingInputRegistersResponse),
    WriteSingleCoilRequestResponse(WriteSingleCoilRequestResponse),
    WriteSingleRegisterRequestResponse(WriteSingleRegisterRequestResponse),
    DiagnosticsRequestResponse(DiagnosticsRequestResponse),
    WriteMultipleCoilsRequest(WriteMultipleCoilsRequest),
    WriteMultipleCoilsResponse(WriteMultipleCoilsResponse),
    WriteMultipleRegistersRequest(WriteMultipleRegistersRequest),
    WriteMultipleRegistersResponse(WriteMultipleRegistersResponse),
    ReadWriteMultipleRegistersRequest(ReadWriteMultipleRegistersRequest),
    SlaveExceptionResponse(SlaveExceptionResponse),
}

macro_rules! for_each_message {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Message::ReadCoilsInputsRequest($m) => $body,
            Message::ReadCoilsInputsResponse($m) => $body,
            Message::ReadHoldingInputRegistersRequest($m) => $body,
            Message::ReadHoldingInputRegistersResponse($m) => $body,
            Message::WriteSingleCoilRequestResponse($m) => $body,
            Message::WriteSingleRegisterRequestResponse($m) => $body,
            Message::DiagnosticsRequestResponse($m) => $body,
            Message::WriteMultipleCoilsRequest($m) => $body,
            Message::WriteMultipleCoilsResponse($m) => $body,
            Message::WriteMultipleRegistersRequest($m) => $body,
            Message::WriteMultipleRegistersResponse($m) => $body,
            Message::ReadWriteMultipleRegistersRequest($m) => $body,
            Message::SlaveExceptionResponse($m) => $body,
        }
    };
}

impl ModbusMessage for Message {
    fn header(&self) -> &MessageHeader {
        for_each_message!(self, m => m.header())
    }
    fn header_mut(&mut self) -> &mut MessageHeader {
        for_each_message!(self, m => m.header_mut())
    }
    fn protocol_data_unit(&self) -> Vec<u8> {
        for_each_message!(self, m => m.protocol_data_unit())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for_each_message!(self, m => fmt::Display::fmt(m, f))
    }
}

macro_rules! impl_message_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Self::$ty(m)
                }
            }
        )*
    };
}

impl_message_kind!(
    ReadCoilsInputsRequest,
    ReadCoilsInputsResponse,
    ReadHoldingInputRegistersRequest,
    ReadHoldingInputRegistersResponse,
    WriteSingleCoilRequestResponse,
    WriteSingleRegisterRequestResponse,
    DiagnosticsRequestResponse,
    WriteMultipleCoilsRequest,
    WriteMultipleCoilsResponse,
    WriteMultipleRegistersRequest,
    WriteMultipleRegistersResponse,
    ReadWriteMultipleRegistersRequest,
    SlaveExceptionResponse,
);

pub(crate) fn check_points(points: usize, max: usize, what: &str) -> Result<(), ModbusError> {
    if points > max {
        return Err(ModbusError::Range(format!(
            "maximum amount of {what} is {max}, got {points}"
        )));
    }
    Ok(())
}

/// Declared byte count must fit in the frame after `offset`.
pub(crate) fn check_byte_count(frame: &[u8], offset: usize, byte_count: usize) -> Result<(), ModbusError> {
    if frame.len() < offset + byte_count {
        return Err(ModbusError::format(
            format!(
                "byte count field declares {byte_count} bytes but only {} follow",
                frame.len().saturating_sub(offset)
            ),
            frame.len(),
        ));
    }
    Ok(())
}

pub(crate) fn mismatch(what: &str, expected: impl fmt::Display, received: impl fmt::Display) -> ModbusError {
    ModbusError::io(format!(
        "Unexpected {what} in response. Expected {expected}, received {received}."
    ))
}

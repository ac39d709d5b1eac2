//! Per-function-code services used by transports and the slave network.
//!
//! Each supported function code maps to a [`FunctionService`]: a small table of
//! function pointers that decodes a request frame, tells the RTU reader how many
//! bytes remain after the fixed prefix, and executes a request against a
//! [`SlaveDataStore`].

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::ModbusError;
use crate::message::{
    create_modbus_message, DiagnosticsRequestResponse, Message, ModbusMessage,
    ReadCoilsInputsRequest, ReadCoilsInputsResponse, ReadHoldingInputRegistersRequest,
    ReadHoldingInputRegistersResponse, ReadWriteMultipleRegistersRequest,
    WriteMultipleCoilsRequest, WriteMultipleCoilsResponse, WriteMultipleRegistersRequest,
    WriteMultipleRegistersResponse, WriteSingleCoilRequestResponse,
    WriteSingleRegisterRequestResponse,
};
use crate::modbus_define as md;
use crate::point_store::{PointSource, SlaveDataStore};

type CreateRequestFn = fn(&[u8]) -> Result<Message, ModbusError>;
type BytesToReadFn = fn(&[u8]) -> Result<usize, ModbusError>;
type HandleFn = fn(&Message, &SlaveDataStore) -> Result<Message, ModbusError>;

#[derive(Clone, Copy)]
pub struct FunctionService {
    pub function_code: u8,
    pub name: &'static str,
    create_request: CreateRequestFn,
    rtu_request_bytes_to_read: BytesToReadFn,
    rtu_response_bytes_to_read: BytesToReadFn,
    handle: HandleFn,
}

impl std::fmt::Debug for FunctionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionService")
            .field("function_code", &self.function_code)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FunctionService {
    pub fn create_request(&self, frame: &[u8]) -> Result<Message, ModbusError> {
        (self.create_request)(frame)
    }

    /// Bytes still to read after the 7-byte RTU request prefix (checksum included).
    pub fn rtu_request_bytes_to_read(&self, frame_start: &[u8]) -> Result<usize, ModbusError> {
        need_prefix(frame_start, md::RTU_REQUEST_FRAME_START_LENGTH)?;
        (self.rtu_request_bytes_to_read)(frame_start)
    }

    /// Bytes still to read after the 4-byte RTU response prefix (checksum included).
    pub fn rtu_response_bytes_to_read(&self, frame_start: &[u8]) -> Result<usize, ModbusError> {
        need_prefix(frame_start, md::RTU_RESPONSE_FRAME_START_LENGTH)?;
        (self.rtu_response_bytes_to_read)(frame_start)
    }

    pub fn handle(&self, request: &Message, store: &SlaveDataStore) -> Result<Message, ModbusError> {
        (self.handle)(request, store)
    }
}

fn need_prefix(frame_start: &[u8], len: usize) -> Result<(), ModbusError> {
    if frame_start.len() < len {
        return Err(ModbusError::format(
            format!("rtu frame prefix must be {len} bytes"),
            frame_start.len(),
        ));
    }
    Ok(())
}

/// Function code -> service table.
#[derive(Debug)]
pub struct FunctionServiceRegistry {
    services: HashMap<u8, FunctionService>,
}

static STANDARD_REGISTRY: Lazy<FunctionServiceRegistry> = Lazy::new(|| {
    let mut services = HashMap::new();
    for s in standard_services() {
        services.insert(s.function_code, s);
    }
    FunctionServiceRegistry { services }
});

impl FunctionServiceRegistry {
    /// Services for every supported function code.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD_REGISTRY
    }

    pub fn get(&self, function_code: u8) -> Result<&FunctionService, ModbusError> {
        self.services
            .get(&function_code)
            .ok_or(ModbusError::UnsupportedFunction(function_code))
    }

    #[must_use]
    pub fn function_codes(&self) -> Vec<u8> {
        let mut codes: Vec<u8> = self.services.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Decode an inbound request frame by its function code.
    pub fn create_modbus_request(&self, frame: &[u8]) -> Result<Message, ModbusError> {
        if frame.len() < 3 {
            return Err(ModbusError::format(
                "argument 'frame' must have a length of at least 3 bytes",
                frame.len(),
            ));
        }
        self.get(frame[1])?.create_request(frame)
    }
}

fn unexpected_request(request: &Message, expected: &str) -> ModbusError {
    ModbusError::Protocol(format!(
        "service expected {expected}, got function code {}",
        request.function_code()
    ))
}

fn decode<T>(frame: &[u8]) -> Result<Message, ModbusError>
where
    T: crate::message::FromFrame + Into<Message>,
{
    create_modbus_message::<T>(frame).map(Into::into)
}

fn one_byte(_: &[u8]) -> Result<usize, ModbusError> {
    Ok(1)
}

fn four_bytes(_: &[u8]) -> Result<usize, ModbusError> {
    Ok(4)
}

// byte count at [2], then the data bytes and CRC minus the data byte already read
fn byte_count_plus_one(frame_start: &[u8]) -> Result<usize, ModbusError> {
    Ok(usize::from(frame_start[2]) + 1)
}

// byte count at [6], then the data bytes and both CRC bytes
fn write_multiple_request_bytes(frame_start: &[u8]) -> Result<usize, ModbusError> {
    Ok(usize::from(frame_start[6]) + 2)
}

fn read_write_request_bytes(_: &[u8]) -> Result<usize, ModbusError> {
    // byte count sits at [10], beyond the 7-byte prefix
    Err(ModbusError::UnsupportedFunction(md::READ_WRITE_MULTIPLE_REGISTERS))
}

fn read_discretes(
    request: &Message,
    source: &PointSource<bool>,
) -> Result<Message, ModbusError> {
    let Message::ReadCoilsInputsRequest(req) = request else {
        return Err(unexpected_request(request, "read coils/inputs"));
    };
    let values = source.read_points(req.start_address, usize::from(req.number_of_points))?;
    Ok(ReadCoilsInputsResponse::new(req.function_code(), req.slave_address(), values.into())?.into())
}

fn read_registers(
    request: &Message,
    source: &PointSource<u16>,
) -> Result<Message, ModbusError> {
    let Message::ReadHoldingInputRegistersRequest(req) = request else {
        return Err(unexpected_request(request, "read registers"));
    };
    let values = source.read_points(req.start_address, usize::from(req.number_of_points))?;
    Ok(ReadHoldingInputRegistersResponse::new(
        req.function_code(),
        req.slave_address(),
        values.into(),
    )?
    .into())
}

fn handle_read_coils(request: &Message, store: &SlaveDataStore) -> Result<Message, ModbusError> {
    read_discretes(request, &store.coil_discretes)
}

fn handle_read_inputs(request: &Message, store: &SlaveDataStore) -> Result<Message, ModbusError> {
    read_discretes(request, &store.coil_inputs)
}

fn handle_read_holding(request: &Message, store: &SlaveDataStore) -> Result<Message, ModbusError> {
    read_registers(request, &store.holding_registers)
}

fn handle_read_input_registers(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    read_registers(request, &store.input_registers)
}

fn handle_write_single_coil(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    let Message::WriteSingleCoilRequestResponse(req) = request else {
        return Err(unexpected_request(request, "write single coil"));
    };
    store
        .coil_discretes
        .write_points(req.start_address, &[req.value])?;
    Ok(request.clone())
}

fn handle_write_single_register(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    let Message::WriteSingleRegisterRequestResponse(req) = request else {
        return Err(unexpected_request(request, "write single register"));
    };
    store
        .holding_registers
        .write_points(req.start_address, &[req.value])?;
    Ok(request.clone())
}

fn handle_diagnostics(request: &Message, _store: &SlaveDataStore) -> Result<Message, ModbusError> {
    match request {
        Message::DiagnosticsRequestResponse(_) => Ok(request.clone()),
        _ => Err(unexpected_request(request, "diagnostics")),
    }
}

fn handle_write_multiple_coils(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    let Message::WriteMultipleCoilsRequest(req) = request else {
        return Err(unexpected_request(request, "write multiple coils"));
    };
    store
        .coil_discretes
        .write_points(req.start_address, req.data().as_slice())?;
    let points = u16::try_from(req.number_of_points())
        .map_err(|_| ModbusError::Range("too many coils".into()))?;
    Ok(WriteMultipleCoilsResponse::new(req.slave_address(), req.start_address, points)?.into())
}

fn handle_write_multiple_registers(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    let Message::WriteMultipleRegistersRequest(req) = request else {
        return Err(unexpected_request(request, "write multiple registers"));
    };
    store
        .holding_registers
        .write_points(req.start_address, req.data().as_slice())?;
    let points = u16::try_from(req.number_of_points())
        .map_err(|_| ModbusError::Range("too many registers".into()))?;
    Ok(WriteMultipleRegistersResponse::new(req.slave_address(), req.start_address, points)?.into())
}

fn handle_read_write_multiple_registers(
    request: &Message,
    store: &SlaveDataStore,
) -> Result<Message, ModbusError> {
    let Message::ReadWriteMultipleRegistersRequest(req) = request else {
        return Err(unexpected_request(request, "read/write multiple registers"));
    };
    let write = req.write_request();
    store
        .holding_registers
        .write_points(write.start_address, write.data().as_slice())?;
    let read = req.read_request();
    let values = store
        .holding_registers
        .read_points(read.start_address, usize::from(read.number_of_points))?;
    Ok(ReadHoldingInputRegistersResponse::new(
        req.function_code(),
        req.slave_address(),
        values.into(),
    )?
    .into())
}

fn standard_services() -> [FunctionService; 10] {
    [
        FunctionService {
            function_code: md::READ_COILS,
            name: "ReadCoils",
            create_request: decode::<ReadCoilsInputsRequest>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: byte_count_plus_one,
            handle: handle_read_coils,
        },
        FunctionService {
            function_code: md::READ_INPUTS,
            name: "ReadInputs",
            create_request: decode::<ReadCoilsInputsRequest>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: byte_count_plus_one,
            handle: handle_read_inputs,
        },
        FunctionService {
            function_code: md::READ_HOLDING_REGISTERS,
            name: "ReadHoldingRegisters",
            create_request: decode::<ReadHoldingInputRegistersRequest>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: byte_count_plus_one,
            handle: handle_read_holding,
        },
        FunctionService {
            function_code: md::READ_INPUT_REGISTERS,
            name: "ReadInputRegisters",
            create_request: decode::<ReadHoldingInputRegistersRequest>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: byte_count_plus_one,
            handle: handle_read_input_registers,
        },
        FunctionService {
            function_code: md::WRITE_SINGLE_COIL,
            name: "WriteSingleCoil",
            create_request: decode::<WriteSingleCoilRequestResponse>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: four_bytes,
            handle: handle_write_single_coil,
        },
        FunctionService {
            function_code: md::WRITE_SINGLE_REGISTER,
            name: "WriteSingleRegister",
            create_request: decode::<WriteSingleRegisterRequestResponse>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: four_bytes,
            handle: handle_write_single_register,
        },
        FunctionService {
            function_code: md::DIAGNOSTICS,
            name: "Diagnostics",
            create_request: decode::<DiagnosticsRequestResponse>,
            rtu_request_bytes_to_read: one_byte,
            rtu_response_bytes_to_read: four_bytes,
            handle: handle_diagnostics,
        },
        FunctionService {
            function_code: md::WRITE_MULTIPLE_COILS,
            name: "WriteMultipleCoils",
            create_request: decode::<WriteMultipleCoilsRequest>,
            rtu_request_bytes_to_read: write_multiple_request_bytes,
            rtu_response_bytes_to_read: four_bytes,
            handle: handle_write_multiple_coils,
        },
        FunctionService {
            function_code: md::WRITE_MULTIPLE_REGISTERS,
            name: "WriteMultipleRegisters",
            create_request: decode::<WriteMultipleRegistersRequest>,
            rtu_request_bytes_to_read: write_multiple_request_bytes,
            rtu_response_bytes_to_read: four_bytes,
            handle: handle_write_multiple_registers,
        },
        FunctionService {
            function_code: md::READ_WRITE_MULTIPLE_REGISTERS,
            name: "ReadWriteMultipleRegisters",
            create_request: decode::<ReadWriteMultipleRegistersRequest>,
            rtu_request_bytes_to_read: read_write_request_bytes,
            rtu_response_bytes_to_read: byte_count_plus_one,
            handle: handle_read_write_multiple_registers,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::RegisterCollection;

    fn registry() -> &'static FunctionServiceRegistry {
        FunctionServiceRegistry::standard()
    }

    #[test]
    fn every_code_registered() {
        assert_eq!(registry().function_codes(), vec![1, 2, 3, 4, 5, 6, 8, 15, 16, 23]);
    }

    #[test]
    fn unknown_code_is_unsupported() {
        assert!(matches!(
            registry().create_modbus_request(&[1, 0x2B, 0x0E, 1]),
            Err(ModbusError::UnsupportedFunction(0x2B))
        ));
        assert!(matches!(
            registry().create_modbus_request(&[1, 3]),
            Err(ModbusError::Format { frame_len: 2, .. })
        ));
    }

    #[test]
    fn rtu_trailing_byte_counts() {
        let read = registry().get(md::READ_COILS).expect("service");
        assert_eq!(read.rtu_request_bytes_to_read(&[2, 1, 0, 0, 0, 1, 0xFD]).expect("req"), 1);
        assert_eq!(read.rtu_response_bytes_to_read(&[2, 1, 3, 0]).expect("resp"), 4);

        let wmr = registry().get(md::WRITE_MULTIPLE_REGISTERS).expect("service");
        assert_eq!(wmr.rtu_request_bytes_to_read(&[11, 16, 0, 5, 0, 1, 2]).expect("req"), 4);
        assert_eq!(wmr.rtu_response_bytes_to_read(&[11, 16, 0, 5]).expect("resp"), 4);

        let diag = registry().get(md::DIAGNOSTICS).expect("service");
        assert_eq!(diag.rtu_response_bytes_to_read(&[1, 8, 0, 0]).expect("resp"), 4);

        let rw = registry().get(md::READ_WRITE_MULTIPLE_REGISTERS).expect("service");
        assert!(rw.rtu_request_bytes_to_read(&[1, 23, 0, 0, 0, 1, 0]).is_err());
        assert_eq!(rw.rtu_response_bytes_to_read(&[1, 23, 2, 0]).expect("resp"), 3);

        assert!(read.rtu_response_bytes_to_read(&[2, 1]).is_err());
    }

    #[test]
    fn execute_read_coils() {
        let store = SlaveDataStore::new();
        store.coil_discretes.write_points(0, &[true]).expect("seed");
        let svc = registry().get(md::READ_COILS).expect("service");
        let req = svc.create_request(&[2, 1, 0, 0, 0, 1]).expect("decode");
        let resp = svc.handle(&req, &store).expect("handle");
        assert_eq!(resp.protocol_data_unit(), vec![1, 1, 1]);
    }

    #[test]
    fn execute_write_then_read_back() {
        let store = SlaveDataStore::new();
        let req: Message = ReadWriteMultipleRegistersRequest::new(
            1,
            14,
            3,
            14,
            RegisterCollection::from_values(vec![7, 8, 9]),
        )
        .expect("req")
        .into();
        let resp = registry()
            .get(md::READ_WRITE_MULTIPLE_REGISTERS)
            .expect("service")
            .handle(&req, &store)
            .expect("handle");
        assert_eq!(resp.protocol_data_unit(), vec![23, 6, 0, 7, 0, 8, 0, 9]);
        assert_eq!(
            store.holding_registers.read_points(14, 3).expect("read"),
            vec![7, 8, 9]
        );
    }

    #[test]
    fn execute_write_multiple_coils() {
        let store = SlaveDataStore::new();
        let svc = registry().get(md::WRITE_MULTIPLE_COILS).expect("service");
        let req = svc
            .create_request(&[17, 15, 0, 19, 0, 10, 2, 205, 1])
            .expect("decode");
        let resp = svc.handle(&req, &store).expect("handle");
        assert_eq!(resp.protocol_data_unit(), vec![15, 0, 19, 0, 10]);
        assert_eq!(
            store.coil_discretes.read_points(19, 10).expect("read"),
            vec![true, false, true, true, false, false, true, true, true, false]
        );
    }

    #[test]
    fn out_of_space_read_is_illegal_address() {
        let store = SlaveDataStore::new();
        let svc = registry().get(md::READ_HOLDING_REGISTERS).expect("service");
        let req = svc.create_request(&[1, 3, 0xFF, 0xFF, 0, 2]).expect("decode");
        assert!(matches!(
            svc.handle(&req, &store),
            Err(ModbusError::IllegalDataAddress(_))
        ));
    }

    #[test]
    fn mismatched_message_rejected() {
        let store = SlaveDataStore::new();
        let req: Message = WriteSingleRegisterRequestResponse::new(1, 0, 1).into();
        assert!(registry()
            .get(md::READ_COILS)
            .expect("service")
            .handle(&req, &store)
            .is_err());
    }
}

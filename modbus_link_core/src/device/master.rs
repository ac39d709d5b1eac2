use crate::collections::{DiscreteCollection, RegisterCollection};
use crate::error::ModbusError;
use crate::message::{
    DiagnosticsRequestResponse, ModbusRequest, ReadCoilsInputsRequest,
    ReadHoldingInputRegistersRequest, ReadWriteMultipleRegistersRequest,
    WriteMultipleCoilsRequest, WriteMultipleRegistersRequest, WriteSingleCoilRequestResponse,
    WriteSingleRegisterRequestResponse,
};
use crate::modbus_define::{
    BROADCAST_ADDRESS, READ_COILS, READ_HOLDING_REGISTERS, READ_INPUTS, READ_INPUT_REGISTERS,
};
use crate::stream::StreamResource;
use crate::transport::ModbusTransport;

/// Typed client over one transport.
///
/// Writes addressed to unit 0 are broadcast: sent once, no reply awaited.
/// Reads cannot be broadcast.
#[derive(Debug)]
pub struct ModbusMaster<S> {
    transport: ModbusTransport<S>,
}

impl<S: StreamResource> ModbusMaster<S> {
    pub const fn new(transport: ModbusTransport<S>) -> Self {
        Self { transport }
    }

    pub const fn transport(&self) -> &ModbusTransport<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut ModbusTransport<S> {
        &mut self.transport
    }

    pub fn into_transport(self) -> ModbusTransport<S> {
        self.transport
    }

    fn check_unicast(slave_address: u8) -> Result<(), ModbusError> {
        if slave_address == BROADCAST_ADDRESS {
            return Err(ModbusError::Range(
                "reads cannot be broadcast to slave address 0".into(),
            ));
        }
        Ok(())
    }

    async fn request<R: ModbusRequest>(&mut self, mut request: R) -> Result<R::Response, ModbusError> {
        self.transport.unicast_message(&mut request).await?.into_result()
    }

    /// Unicast and discard the echo, or write once for a broadcast.
    async fn write_request<R: ModbusRequest>(&mut self, mut request: R) -> Result<(), ModbusError> {
        if request.slave_address() == BROADCAST_ADDRESS {
            return self.transport.write(&mut request).await;
        }
        self.request(request).await.map(|_| ())
    }

    async fn read_discretes(
        &mut self,
        function_code: u8,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<bool>, ModbusError> {
        Self::check_unicast(slave_address)?;
        let request =
            ReadCoilsInputsRequest::new(function_code, slave_address, start_address, number_of_points)?;
        let mut data = self.request(request).await?.into_data();
        // the reply is padded to whole bytes
        data.truncate(usize::from(number_of_points));
        Ok(data.into_vec())
    }

    async fn read_registers(
        &mut self,
        function_code: u8,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        Self::check_unicast(slave_address)?;
        let request = ReadHoldingInputRegistersRequest::new(
            function_code,
            slave_address,
            start_address,
            number_of_points,
        )?;
        Ok(self.request(request).await?.into_data().into_vec())
    }

    /// Read 1 to 2000 contiguous coils.
    pub async fn read_coils(
        &mut self,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<bool>, ModbusError> {
        self.read_discretes(READ_COILS, slave_address, start_address, number_of_points)
            .await
    }

    /// Read 1 to 2000 contiguous discrete inputs.
    pub async fn read_inputs(
        &mut self,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<bool>, ModbusError> {
        self.read_discretes(READ_INPUTS, slave_address, start_address, number_of_points)
            .await
    }

    /// Read 1 to 125 contiguous holding registers.
    pub async fn read_holding_registers(
        &mut self,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.read_registers(READ_HOLDING_REGISTERS, slave_address, start_address, number_of_points)
            .await
    }

    /// Read 1 to 125 contiguous input registers.
    pub async fn read_input_registers(
        &mut self,
        slave_address: u8,
        start_address: u16,
        number_of_points: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.read_registers(READ_INPUT_REGISTERS, slave_address, start_address, number_of_points)
            .await
    }

    pub async fn write_single_coil(
        &mut self,
        slave_address: u8,
        coil_address: u16,
        value: bool,
    ) -> Result<(), ModbusError> {
        self.write_request(WriteSingleCoilRequestResponse::new(slave_address, coil_address, value))
            .await
    }

    pub async fn write_single_register(
        &mut self,
        slave_address: u8,
        register_address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        self.write_request(WriteSingleRegisterRequestResponse::new(
            slave_address,
            register_address,
            value,
        ))
        .await
    }

    pub async fn write_multiple_coils(
        &mut self,
        slave_address: u8,
        start_address: u16,
        data: &[bool],
    ) -> Result<(), ModbusError> {
        let request = WriteMultipleCoilsRequest::new(
            slave_address,
            start_address,
            DiscreteCollection::from_values(data),
        )?;
        self.write_request(request).await
    }

    pub async fn write_multiple_registers(
        &mut self,
        slave_address: u8,
        start_address: u16,
        data: &[u16],
    ) -> Result<(), ModbusError> {
        let request = WriteMultipleRegistersRequest::new(
            slave_address,
            start_address,
            RegisterCollection::from_values(data),
        )?;
        self.write_request(request).await
    }

    /// Write `write_data` starting at `start_write_address`, then read back
    /// `number_of_points_to_read` registers, in one transaction.
    pub async fn read_write_multiple_registers(
        &mut self,
        slave_address: u8,
        start_read_address: u16,
        number_of_points_to_read: u16,
        start_write_address: u16,
        write_data: &[u16],
    ) -> Result<Vec<u16>, ModbusError> {
        Self::check_unicast(slave_address)?;
        let request = ReadWriteMultipleRegistersRequest::new(
            slave_address,
            start_read_address,
            number_of_points_to_read,
            start_write_address,
            RegisterCollection::from_values(write_data),
        )?;
        Ok(self.request(request).await?.into_data().into_vec())
    }

    /// Serial line loopback: the slave should echo `data` back.
    pub async fn return_query_data(&mut self, slave_address: u8, data: u16) -> Result<bool, ModbusError> {
        if !self.transport.framing().is_serial() {
            return Err(ModbusError::io(
                "return query data is only supported on serial framings",
            ));
        }
        Self::check_unicast(slave_address)?;
        let request = DiagnosticsRequestResponse::return_query_data(
            slave_address,
            RegisterCollection::from_values(vec![data]),
        )?;
        let response = self.request(request).await?;
        Ok(response.data.get(0) == Some(data))
    }
}

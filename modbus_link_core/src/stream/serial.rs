use std::time::Duration;

use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};

use super::{timed_read, timed_write, StreamResource, DEFAULT_TIMEOUT};
use crate::error::ModbusError;

/// Serial line settings. Defaults to 9600 8N1.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl SerialSettings {
    #[must_use]
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Serial port for RTU and ASCII framings. Reopened on `connect` after a failure.
#[derive(Debug)]
pub struct SerialPortAdapter {
    settings: SerialSettings,
    port: Option<SerialStream>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialPortAdapter {
    #[must_use]
    pub const fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    async fn port_mut(&mut self) -> Result<&mut SerialStream, ModbusError> {
        if self.port.is_none() {
            self.connect().await?;
        }
        self.port
            .as_mut()
            .ok_or_else(|| ModbusError::io("serial port unavailable"))
    }
}

impl StreamResource for SerialPortAdapter {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        if self.port.is_some() {
            return Ok(());
        }
        let s = &self.settings;
        let builder = tokio_serial::new(&s.port_name, s.baud_rate)
            .data_bits(s.data_bits)
            .stop_bits(s.stop_bits)
            .parity(s.parity)
            .timeout(self.read_timeout);
        let port = SerialStream::open(&builder)
            .map_err(|e| ModbusError::io(format!("open serial port {}: {e}", s.port_name)))?;
        log::debug!("[MODBUS SERIAL] opened {} at {} baud", s.port_name, s.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ModbusError> {
        self.port = None;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.port.is_some()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        let dur = self.read_timeout;
        let res = timed_read(self.port_mut().await?, buf, dur).await;
        if matches!(res, Err(ModbusError::Io(_))) {
            self.port = None;
        }
        res
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ModbusError> {
        let dur = self.write_timeout;
        let res = timed_write(self.port_mut().await?, buf, dur).await;
        if matches!(res, Err(ModbusError::Io(_))) {
            self.port = None;
        }
        res
    }

    async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        if let Some(port) = self.port.as_mut() {
            port.clear(ClearBuffer::Input)
                .map_err(|e| ModbusError::io(format!("clear serial input: {e}")))?;
        }
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
    fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
    fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }
}

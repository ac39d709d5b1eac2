#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modbus_link::error::ModbusError;
use modbus_link::stream::StreamResource;
use modbus_link::utility::calculate_crc;

/// What the next `read` call sees once the current chunk is used up.
#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Timeout,
    Io(&'static str),
}

/// In-memory stream replaying a fixed script and recording every write.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStream {
    script: Arc<Mutex<VecDeque<Step>>>,
    current: Arc<Mutex<VecDeque<u8>>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ScriptedStream {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Frames written so far; shared with clones handed to a transport.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().expect("written lock").clone()
    }

    pub fn remaining_steps(&self) -> usize {
        self.script.lock().expect("script lock").len()
    }
}

impl StreamResource for ScriptedStream {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ModbusError> {
        Ok(())
    }

    fn connected(&self) -> bool {
        true
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        let mut current = self.current.lock().expect("current lock");
        if current.is_empty() {
            match self.script.lock().expect("script lock").pop_front() {
                Some(Step::Data(bytes)) => current.extend(bytes),
                Some(Step::Io(msg)) => return Err(ModbusError::io(msg)),
                Some(Step::Timeout) | None => return Err(ModbusError::Timeout),
            }
        }
        let n = buf.len().min(current.len());
        for (dst, src) in buf.iter_mut().zip(current.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ModbusError> {
        self.written.lock().expect("written lock").push(buf.to_vec());
        Ok(())
    }

    async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        self.current.lock().expect("current lock").clear();
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

/// `body` followed by its CRC.
pub fn rtu(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    frame.extend_from_slice(&calculate_crc(body));
    frame
}

/// MBAP frame: transaction id, protocol 0, length, then `unit + pdu` from `body`.
pub fn mbap(transaction_id: u16, body: &[u8]) -> Vec<u8> {
    let mut frame = transaction_id.to_be_bytes().to_vec();
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&u16::try_from(body.len()).expect("length").to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::{drain_available, timed_read, timed_write, StreamResource, DEFAULT_TIMEOUT};
use crate::error::ModbusError;

/// Adapter over an already-open tokio stream: an accepted `TcpStream`, one end
/// of a `tokio::io::duplex` pipe, a pseudo terminal, ...
///
/// There is nothing to reconnect to; once disconnected every operation fails.
#[derive(Debug)]
pub struct IoStreamAdapter<T> {
    io: Option<T>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<T> IoStreamAdapter<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[must_use]
    pub const fn new(io: T) -> Self {
        Self {
            io: Some(io),
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn get_ref(&self) -> Option<&T> {
        self.io.as_ref()
    }

    pub fn into_inner(self) -> Option<T> {
        self.io
    }

    fn io_mut(&mut self) -> Result<&mut T, ModbusError> {
        self.io
            .as_mut()
            .ok_or_else(|| ModbusError::io("stream is disconnected"))
    }
}

impl<T> StreamResource for IoStreamAdapter<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn connect(&mut self) -> Result<(), ModbusError> {
        self.io_mut().map(|_| ())
    }

    async fn disconnect(&mut self) -> Result<(), ModbusError> {
        if let Some(mut io) = self.io.take() {
            let _ = io.shutdown().await;
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.io.is_some()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        let dur = self.read_timeout;
        timed_read(self.io_mut()?, buf, dur).await
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ModbusError> {
        let dur = self.write_timeout;
        timed_write(self.io_mut()?, buf, dur).await
    }

    async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        drain_available(self.io_mut()?).await.map(|_| ())
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

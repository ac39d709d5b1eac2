use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::{drain_available, timed, timed_read, timed_write, StreamResource, DEFAULT_TIMEOUT};
use crate::error::ModbusError;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP client that (re)connects on demand.
///
/// A failed read or write drops the connection; the next operation reconnects.
#[derive(Debug)]
pub struct TcpClientAdapter {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpClientAdapter {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Wrap an established connection; reconnects go to its peer address.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ModbusError> {
        let peer = stream.peer_addr()?;
        let mut adapter = Self::new(peer.ip().to_string(), peer.port());
        adapter.stream = Some(stream);
        Ok(adapter)
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn stream_mut(&mut self) -> Result<&mut TcpStream, ModbusError> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        self.stream
            .as_mut()
            .ok_or_else(|| ModbusError::io("tcp stream unavailable"))
    }

    fn drop_on_error<T>(&mut self, res: Result<T, ModbusError>) -> Result<T, ModbusError> {
        if let Err(e) = &res {
            if !matches!(e, ModbusError::Timeout) {
                log::debug!("[MODBUS TCP] dropping connection to {}: {}", self.addr(), e);
                self.stream = None;
            }
        }
        res
    }
}

impl StreamResource for TcpClientAdapter {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.addr();
        let stream = timed(self.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|e| match e {
                ModbusError::Timeout => ModbusError::Timeout,
                other => ModbusError::io(format!("connect {addr}: {other}")),
            })?;
        stream.set_nodelay(true)?;
        log::debug!("[MODBUS TCP] connected to {addr}");
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ModbusError> {
        if let Some(mut s) = self.stream.take() {
            let _ = s.shutdown().await;
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        let dur = self.read_timeout;
        let res = match self.stream_mut().await {
            Ok(s) => timed_read(s, buf, dur).await,
            Err(e) => Err(e),
        };
        // a zero-byte read means the peer closed; reconnect next time
        let res = match res {
            Ok(0) => {
                self.stream = None;
                Ok(0)
            }
            other => other,
        };
        self.drop_on_error(res)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ModbusError> {
        let dur = self.write_timeout;
        let res = match self.stream_mut().await {
            Ok(s) => timed_write(s, buf, dur).await,
            Err(e) => Err(e),
        };
        self.drop_on_error(res)
    }

    async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        match self.stream.as_mut() {
            Some(s) => drain_available(s).await.map(|_| ()),
            None => Ok(()),
        }
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

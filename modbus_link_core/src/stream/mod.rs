//! Raw byte-stream resources the transports sit on.
//!
//! A [`StreamResource`] is a duplex byte pipe with connect/disconnect, bounded
//! reads and writes, and per-direction timeouts. Adapters are provided for a
//! TCP client, a UDP socket, any tokio `AsyncRead + AsyncWrite` stream, and
//! (feature `serial`) a serial port.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout as tokio_timeout;

use crate::error::ModbusError;

mod io_stream;
#[cfg(feature = "serial")]
mod serial;
mod tcp;
mod udp;

pub use io_stream::IoStreamAdapter;
#[cfg(feature = "serial")]
pub use serial::{SerialPortAdapter, SerialSettings};
pub use tcp::TcpClientAdapter;
pub use udp::UdpClientAdapter;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

pub trait StreamResource: Send {
    /// Open the underlying resource if it is not open yet.
    fn connect(&mut self) -> impl Future<Output = Result<(), ModbusError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = Result<(), ModbusError>> + Send;

    fn connected(&self) -> bool;

    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, ModbusError>> + Send;

    /// Write all of `buf`.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), ModbusError>> + Send;

    /// Drop any bytes already received but not yet read.
    fn discard_in_buffer(&mut self) -> impl Future<Output = Result<(), ModbusError>> + Send;

    fn read_timeout(&self) -> Duration;
    fn set_read_timeout(&mut self, timeout: Duration);
    fn write_timeout(&self) -> Duration;
    fn set_write_timeout(&mut self, timeout: Duration);
}

/// Run `fut` under `dur`; an elapsed timer or a `TimedOut` io error becomes `ModbusError::Timeout`.
pub(crate) async fn timed<T>(
    dur: Duration,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, ModbusError> {
    match tokio_timeout(dur, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(ModbusError::from_io_timeout(e)),
        Err(_) => Err(ModbusError::Timeout),
    }
}

pub(crate) async fn timed_read<T: AsyncRead + Unpin>(
    io: &mut T,
    buf: &mut [u8],
    dur: Duration,
) -> Result<usize, ModbusError> {
    timed(dur, io.read(buf)).await
}

pub(crate) async fn timed_write<T: AsyncWrite + Unpin>(
    io: &mut T,
    buf: &[u8],
    dur: Duration,
) -> Result<(), ModbusError> {
    timed(dur, async {
        io.write_all(buf).await?;
        io.flush().await
    })
    .await
}

/// Read and drop whatever is immediately available, without waiting.
pub(crate) async fn drain_available<T: AsyncRead + Unpin>(io: &mut T) -> Result<usize, ModbusError> {
    let mut scratch = [0u8; 256];
    let mut dropped = 0usize;
    // a zero timeout still polls the read once
    while let Ok(res) = tokio_timeout(Duration::ZERO, io.read(&mut scratch)).await {
        match res {
            Ok(0) => break,
            Ok(n) => dropped += n,
            Err(e) => return Err(ModbusError::from_io_timeout(e)),
        }
    }
    if dropped > 0 {
        log::debug!("discarded {dropped} stale inbound bytes");
    }
    Ok(dropped)
}

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, UdpSocket};

use super::{timed, StreamResource, DEFAULT_TIMEOUT};
use crate::error::ModbusError;

const DATAGRAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum UdpMode {
    /// Socket connected to one remote slave.
    Master { host: String, port: u16 },
    /// Bound socket answering whoever sent the last datagram.
    Slave,
}

/// UDP socket presented as a byte stream.
///
/// Each received datagram is buffered and handed out across as many `read`
/// calls as the framing layer needs.
#[derive(Debug)]
pub struct UdpClientAdapter {
    mode: UdpMode,
    socket: Option<UdpSocket>,
    pending: VecDeque<u8>,
    last_peer: Option<SocketAddr>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl UdpClientAdapter {
    /// Master side: sends every request to `host:port`. The socket is bound on first use.
    #[must_use]
    pub fn master(host: impl Into<String>, port: u16) -> Self {
        Self::with_mode(
            UdpMode::Master {
                host: host.into(),
                port,
            },
            None,
        )
    }

    /// Slave side over an already bound socket; replies go to the last sender.
    #[must_use]
    pub fn slave(socket: UdpSocket) -> Self {
        Self::with_mode(UdpMode::Slave, Some(socket))
    }

    fn with_mode(mode: UdpMode, socket: Option<UdpSocket>) -> Self {
        Self {
            mode,
            socket,
            pending: VecDeque::new(),
            last_peer: None,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn last_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ModbusError> {
        self.socket()?.local_addr().map_err(ModbusError::from)
    }

    fn socket(&self) -> Result<&UdpSocket, ModbusError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ModbusError::io("udp socket is not open"))
    }

    async fn fill_pending(&mut self) -> Result<usize, ModbusError> {
        let dur = self.read_timeout;
        let mut datagram = [0u8; DATAGRAM_CAPACITY];
        let n = match self.mode {
            UdpMode::Master { .. } => {
                let socket = self.socket()?;
                timed(dur, socket.recv(&mut datagram)).await?
            }
            UdpMode::Slave => {
                let socket = self.socket()?;
                let (n, peer) = timed(dur, socket.recv_from(&mut datagram)).await?;
                self.last_peer = Some(peer);
                n
            }
        };
        self.pending.extend(&datagram[..n]);
        Ok(n)
    }
}

impl StreamResource for UdpClientAdapter {
    async fn connect(&mut self) -> Result<(), ModbusError> {
        if self.socket.is_some() {
            return Ok(());
        }
        let UdpMode::Master { host, port } = &self.mode else {
            return Err(ModbusError::io("udp slave socket was closed"));
        };
        let remote = lookup_host((host.as_str(), *port))
            .await?
            .next()
            .ok_or_else(|| ModbusError::io(format!("cannot resolve {host}:{port}")))?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        log::debug!("[MODBUS UDP] socket {} -> {remote}", socket.local_addr()?);
        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ModbusError> {
        self.socket = None;
        self.pending.clear();
        Ok(())
    }

    fn connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ModbusError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.connect().await?;
        // an empty datagram is not end of stream
        while self.pending.is_empty() {
            if self.fill_pending().await? == 0 {
                log::debug!("[MODBUS UDP] ignoring empty datagram");
            }
        }
        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ModbusError> {
        self.connect().await?;
        let dur = self.write_timeout;
        let socket = self.socket()?;
        let sent = match self.mode {
            UdpMode::Master { .. } => timed(dur, socket.send(buf)).await?,
            UdpMode::Slave => {
                let peer = self
                    .last_peer
                    .ok_or_else(|| ModbusError::io("no peer to reply to"))?;
                timed(dur, socket.send_to(buf, peer)).await?
            }
        };
        if sent != buf.len() {
            return Err(ModbusError::io(format!(
                "datagram truncated: sent {sent} of {} bytes",
                buf.len()
            )));
        }
        Ok(())
    }

    async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        let mut dropped = self.pending.len();
        self.pending.clear();
        if let Some(socket) = &self.socket {
            let mut scratch = [0u8; DATAGRAM_CAPACITY];
            loop {
                match socket.try_recv_from(&mut scratch) {
                    Ok((n, _)) => dropped += n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if dropped > 0 {
            log::debug!("[MODBUS UDP] discarded {dropped} stale inbound bytes");
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

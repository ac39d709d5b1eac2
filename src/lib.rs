//! Lightweight mock Modbus slave server for exercising `modbus_link` masters.
//!
//! Every accepted TCP connection (or the single UDP socket) gets its own
//! `SlaveNetwork`, all of them serving the same [`SlaveRegistry`], so a write
//! made over one connection is visible to the next.

pub mod config;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use modbus_link::device::{SlaveNetwork, SlaveRegistry};
use modbus_link::point_store::PointSource;
use modbus_link::stream::{IoStreamAdapter, UdpClientAdapter};
use modbus_link::transport::{Framing, ModbusTransport};
use modbus_link::TransportConfig;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;

pub use config::MockConfig;

#[derive(Debug, Clone)]
pub struct MockServer {
    registry: SlaveRegistry,
    framing: Framing,
    transport: TransportConfig,
    keepalive: Option<Duration>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// MBAP server with a single empty unit 1.
    #[must_use]
    pub fn new() -> Self {
        let registry = SlaveRegistry::new();
        if let Err(e) = registry.add_slave(modbus_link::Slave::new(1)) {
            tracing::error!("failed to register default unit: {e}");
        }
        Self::with_registry(registry)
    }

    #[must_use]
    pub fn with_registry(registry: SlaveRegistry) -> Self {
        Self {
            registry,
            framing: Framing::Ip,
            transport: TransportConfig::new(),
            keepalive: None,
        }
    }

    pub fn from_config(cfg: &MockConfig) -> anyhow::Result<Self> {
        Ok(Self {
            registry: cfg.build_registry()?,
            framing: cfg.listener.framing.into(),
            transport: cfg.transport.clone(),
            keepalive: cfg.listener.keepalive_secs.map(Duration::from_secs),
        })
    }

    #[must_use]
    pub const fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    #[must_use]
    pub fn with_transport_config(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn framing(&self) -> Framing {
        self.framing
    }

    /// Accept connections until `shutdown` turns true. Open connections are
    /// dropped when the listener stops.
    pub async fn run_tcp_listener_on(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let local = listener.local_addr().context("listener address")?;
        tracing::info!(%local, framing = ?self.framing, "mock server listening (tcp)");
        let mut connections = JoinSet::new();
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    tracing::info!(%peer, "connection accepted");
                    self.apply_keepalive(&stream);
                    let mut network = self.network(IoStreamAdapter::new(stream));
                    let rx = shutdown.clone();
                    connections.spawn(async move {
                        if let Err(e) = network.listen(rx).await {
                            tracing::warn!(%peer, "connection ended with error: {e}");
                        }
                        tracing::info!(%peer, "connection closed");
                    });
                }
                Some(done) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!("connection task failed: {e}");
                    }
                }
            }
        }
        connections.shutdown().await;
        tracing::info!(%local, "mock server stopped");
        Ok(())
    }

    /// Serve datagrams on `socket` until `shutdown` turns true. Replies go to
    /// the sender of the last request.
    pub async fn run_udp_on(
        &self,
        socket: UdpSocket,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let local = socket.local_addr().context("socket address")?;
        tracing::info!(%local, framing = ?self.framing, "mock server listening (udp)");
        let mut network = self.network(UdpClientAdapter::slave(socket));
        network.listen(shutdown).await?;
        Ok(())
    }

    fn network<S: modbus_link::stream::StreamResource>(&self, stream: S) -> SlaveNetwork<S> {
        let transport = ModbusTransport::new(stream, self.framing).with_config(self.transport.clone());
        SlaveNetwork::with_registry(transport, self.registry.clone())
    }

    fn apply_keepalive(&self, stream: &TcpStream) {
        let Some(idle) = self.keepalive else {
            return;
        };
        let keepalive = socket2::TcpKeepalive::new().with_time(idle);
        if let Err(e) = socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive) {
            tracing::warn!("failed to enable keep-alive: {e}");
        }
    }

    /// Non-default points of every unit, keyed by address.
    pub fn snapshot(&self) -> anyhow::Result<Vec<SlaveSnapshot>> {
        self.registry
            .slaves()
            .iter()
            .map(|slave| {
                let store = slave.store();
                Ok(SlaveSnapshot {
                    unit_id: slave.unit_id(),
                    coils: points(&store.coil_discretes)?,
                    inputs: points(&store.coil_inputs)?,
                    holding_registers: points(&store.holding_registers)?,
                    input_registers: points(&store.input_registers)?,
                })
            })
            .collect()
    }

    pub fn snapshot_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }
}

fn points<T: Copy + Default + PartialEq>(source: &PointSource<T>) -> anyhow::Result<BTreeMap<u16, T>> {
    Ok(source.non_default_points()?.into_iter().collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaveSnapshot {
    pub unit_id: u8,
    pub coils: BTreeMap<u16, bool>,
    pub inputs: BTreeMap<u16, bool>,
    pub holding_registers: BTreeMap<u16, u16>,
    pub input_registers: BTreeMap<u16, u16>,
}

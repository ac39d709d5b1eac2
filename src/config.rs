//! TOML configuration of the mock server.
//!
//! ```toml
//! [listener]
//! kind = "tcp"          # or "udp"
//! bind = "127.0.0.1:5020"
//! framing = "ip"        # or "rtu" for RTU-over-TCP
//! keepalive_secs = 30
//!
//! [transport]
//! read_timeout_ms = 500
//!
//! [[slaves]]
//! unit_id = 1
//! holding_registers = [{ start = 0, values = [1, 2, 3] }]
//! coils = [{ start = 10, values = [true, false, true] }]
//! ```

use std::path::Path;

use anyhow::{bail, Context};
use modbus_link::device::{Slave, SlaveRegistry};
use modbus_link::point_store::PointSource;
use modbus_link::transport::Framing;
use modbus_link::TransportConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    #[default]
    Tcp,
    Udp,
}

/// Wire encoding the mock speaks. Serial encodings are carried over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MockFraming {
    #[default]
    Ip,
    Rtu,
    Ascii,
}

impl From<MockFraming> for Framing {
    fn from(f: MockFraming) -> Self {
        match f {
            MockFraming::Ip => Self::Ip,
            MockFraming::Rtu => Self::Rtu,
            MockFraming::Ascii => Self::Ascii,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub kind: ListenerKind,
    pub bind: String,
    pub framing: MockFraming,
    /// TCP keep-alive idle time for accepted connections.
    pub keepalive_secs: Option<u64>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            kind: ListenerKind::Tcp,
            bind: "127.0.0.1:5020".into(),
            framing: MockFraming::Ip,
            keepalive_secs: None,
        }
    }
}

/// Consecutive initial values starting at `start`.
#[derive(Debug, Clone, Deserialize)]
pub struct PointBlock<T> {
    pub start: u16,
    pub values: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlaveConfig {
    pub unit_id: u8,
    #[serde(default)]
    pub coils: Vec<PointBlock<bool>>,
    #[serde(default)]
    pub inputs: Vec<PointBlock<bool>>,
    #[serde(default)]
    pub holding_registers: Vec<PointBlock<u16>>,
    #[serde(default)]
    pub input_registers: Vec<PointBlock<u16>>,
}

impl SlaveConfig {
    #[must_use]
    pub const fn empty(unit_id: u8) -> Self {
        Self {
            unit_id,
            coils: Vec::new(),
            inputs: Vec::new(),
            holding_registers: Vec::new(),
            input_registers: Vec::new(),
        }
    }

    /// Build the slave and seed its store.
    pub fn build(&self) -> anyhow::Result<Slave> {
        let slave = Slave::new(self.unit_id);
        let store = slave.store();
        seed(&store.coil_discretes, &self.coils, "coils", self.unit_id)?;
        seed(&store.coil_inputs, &self.inputs, "inputs", self.unit_id)?;
        seed(&store.holding_registers, &self.holding_registers, "holding_registers", self.unit_id)?;
        seed(&store.input_registers, &self.input_registers, "input_registers", self.unit_id)?;
        Ok(slave)
    }
}

fn seed<T: Copy + Default + PartialEq>(
    points: &PointSource<T>,
    blocks: &[PointBlock<T>],
    what: &str,
    unit_id: u8,
) -> anyhow::Result<()> {
    for block in blocks {
        points
            .write_points(block.start, &block.values)
            .with_context(|| format!("unit {unit_id}: {what} block at {}", block.start))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub listener: ListenerConfig,
    pub transport: TransportConfig,
    pub slaves: Vec<SlaveConfig>,
}

impl MockConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse mock config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_toml_str(&s)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = [false; 256];
        for slave in &self.slaves {
            let id = usize::from(slave.unit_id);
            if slave.unit_id == 0 {
                bail!("unit_id 0 is the broadcast address");
            }
            if seen[id] {
                bail!("unit_id {} configured twice", slave.unit_id);
            }
            seen[id] = true;
        }
        Ok(())
    }

    /// Registry holding every configured slave; a lone unit 1 when none are listed.
    pub fn build_registry(&self) -> anyhow::Result<SlaveRegistry> {
        let registry = SlaveRegistry::new();
        if self.slaves.is_empty() {
            registry.add_slave(SlaveConfig::empty(1).build()?)?;
        }
        for slave in &self.slaves {
            registry.add_slave(slave.build()?)?;
        }
        Ok(registry)
    }
}

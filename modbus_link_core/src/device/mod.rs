//! Master and slave roles on top of a [`crate::transport::ModbusTransport`].

mod master;
mod slave;
mod slave_network;

pub use master::ModbusMaster;
pub use slave::{Slave, SlaveRegistry};
pub use slave_network::SlaveNetwork;

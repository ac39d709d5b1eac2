#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::module_name_repetitions
)]

//! modbus_link
//!
//! Modbus master/slave stack over RTU, ASCII and MBAP (TCP/UDP) framings.
//!
//! Main pieces:
//! - message model with encode/decode for function codes 1-6, 8, 15, 16 and 23
//! - [`transport::ModbusTransport`]: framing, checksums, retries and response validation
//! - [`device::ModbusMaster`]: typed read/write calls
//! - [`device::SlaveNetwork`]: serves one or more in-memory slaves
//! - stream adapters for TCP, UDP, tokio streams and (feature `serial`) serial ports
//!
//! ```no_run
//! use modbus_link::device::ModbusMaster;
//! use modbus_link::stream::TcpClientAdapter;
//! use modbus_link::transport::ModbusTransport;
//!
//! # async fn demo() -> Result<(), modbus_link::ModbusError> {
//! let mut master = ModbusMaster::new(ModbusTransport::ip(TcpClientAdapter::new("127.0.0.1", 502)));
//! let registers = master.read_holding_registers(1, 0, 10).await?;
//! # let _ = registers;
//! # Ok(())
//! # }
//! ```

pub mod collections;
pub mod config;
pub mod device;
pub mod error;
pub mod exception_codes;
pub mod function_services;
pub mod message;
pub mod modbus_define;
pub mod point_store;
pub mod stream;
pub mod transport;
pub mod utility;

pub use collections::{DiscreteCollection, RegisterCollection};
pub use config::{BroadcastFailurePolicy, TransportConfig};
pub use device::{ModbusMaster, Slave, SlaveNetwork, SlaveRegistry};
pub use error::{ModbusError, ModbusResult};
pub use transport::{Framing, ModbusTransport};

/// Load the embedded `exception_codes.toml` into the global exception registry.
///
/// Safe to call more than once; later calls merge into what is already registered.
pub fn init_defaults() -> Result<(), ModbusError> {
    exception_codes::ExceptionRegistry::embedded()?.register_or_merge()
}

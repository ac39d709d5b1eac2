//! cargo run --example serial_rtu --features serial -- /dev/ttyUSB0 9600

use std::env;

use modbus_link::device::ModbusMaster;
use modbus_link::stream::{SerialPortAdapter, SerialSettings};
use modbus_link::transport::ModbusTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    modbus_link::init_defaults()?;
    env_logger::init();

    let mut args = env::args().skip(1);
    let port_name = args.next().unwrap_or_else(|| "/dev/ttyUSB0".into());
    let baud_rate: u32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(9600);

    let adapter = SerialPortAdapter::new(SerialSettings::new(port_name, baud_rate));
    let mut master = ModbusMaster::new(ModbusTransport::rtu(adapter));

    let coils = master.read_coils(1, 0, 8).await?;
    println!("coils 0..8: {coils:?}");
    println!("loopback ok: {}", master.return_query_data(1, 0xA5A5).await?);
    Ok(())
}

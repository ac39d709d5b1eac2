use std::env;

use modbus_link::device::ModbusMaster;
use modbus_link::init_defaults;
use modbus_link::stream::TcpClientAdapter;
use modbus_link::transport::ModbusTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_defaults()?;

    // MODBUS_LOG_FRAMES=1 RUST_LOG=debug shows every frame on the wire
    env_logger::init();

    let host = env::var("MODBUS_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = env::var("MODBUS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5020);
    let unit: u8 = env::var("MODBUS_UNIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let mut master = ModbusMaster::new(ModbusTransport::ip(TcpClientAdapter::new(host.clone(), port)));

    println!("Reading 4 holding registers from unit {unit} at {host}:{port}");
    match master.read_holding_registers(unit, 0, 4).await {
        Ok(v) => println!("Read result: {v:?}"),
        Err(e) => eprintln!("Read failed: {e}"),
    }
    Ok(())
}

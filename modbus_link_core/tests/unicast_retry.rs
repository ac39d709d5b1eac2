mod common;

use common::{mbap, rtu, ScriptedStream, Step};
use modbus_link::config::TransportConfig;
use modbus_link::device::ModbusMaster;
use modbus_link::error::ModbusError;
use modbus_link::message::{ModbusMessage, ReadHoldingInputRegistersRequest, Response};
use modbus_link::modbus_define::READ_HOLDING_REGISTERS;
use modbus_link::transport::ModbusTransport;

// read 2 holding registers from unit 1 at address 0
fn request() -> ReadHoldingInputRegistersRequest {
    ReadHoldingInputRegistersRequest::new(READ_HOLDING_REGISTERS, 1, 0, 2).expect("request")
}

fn good_reply() -> Vec<u8> {
    rtu(&[1, 3, 4, 0, 10, 0, 20])
}

fn cfg(retries: usize) -> TransportConfig {
    TransportConfig::new()
        .with_retries(retries)
        .with_wait_to_retry_ms(1)
        .with_old_response_threshold(0)
}

#[tokio::test]
async fn timeout_is_retried() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([Step::Timeout, Step::Data(good_reply())]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(2));
    let mut req = request();
    let resp = transport.unicast_message(&mut req).await?.into_result()?;
    assert_eq!(resp.data().as_slice(), &[10, 20]);
    // request was sent twice
    assert_eq!(stream.written().len(), 2);
    Ok(())
}

#[tokio::test]
async fn last_error_surfaces_after_retries() {
    let stream = ScriptedStream::new([Step::Timeout, Step::Io("line noise"), Step::Timeout]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(1));
    let err = transport.unicast_message(&mut request()).await.unwrap_err();
    assert!(err.to_string().contains("line noise"));
    assert_eq!(stream.written().len(), 2);
    assert_eq!(stream.remaining_steps(), 1);
}

#[tokio::test]
async fn checksum_failure_is_retried() -> Result<(), ModbusError> {
    let mut corrupt = good_reply();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;
    let stream = ScriptedStream::new([Step::Data(corrupt), Step::Data(good_reply())]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(1));
    let resp = transport.unicast_message(&mut request()).await?;
    assert!(matches!(resp, Response::Data(_)));
    assert_eq!(stream.written().len(), 2);
    Ok(())
}

#[tokio::test]
async fn format_error_is_not_retried() {
    // odd byte count: 3 data bytes for a register read
    let stream = ScriptedStream::new([
        Step::Data(rtu(&[1, 3, 3, 0, 1, 2])),
        Step::Data(good_reply()),
    ]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(3));
    let err = transport.unicast_message(&mut request()).await.unwrap_err();
    assert!(matches!(err, ModbusError::Format { .. }));
    assert_eq!(stream.written().len(), 1);
}

#[tokio::test]
async fn acknowledge_reads_again_without_resending() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(rtu(&[1, 0x83, 5])),
        Step::Data(good_reply()),
    ]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(0));
    let resp = transport.unicast_message(&mut request()).await?;
    assert!(matches!(resp, Response::Data(_)));
    assert_eq!(stream.written().len(), 1);
    Ok(())
}

#[tokio::test]
async fn busy_resends_without_consuming_retries() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(rtu(&[1, 0x83, 6])),
        Step::Data(rtu(&[1, 0x83, 6])),
        Step::Data(good_reply()),
    ]);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(cfg(0));
    let resp = transport.unicast_message(&mut request()).await?;
    assert!(matches!(resp, Response::Data(_)));
    assert_eq!(stream.written().len(), 3);
    Ok(())
}

#[tokio::test]
async fn busy_can_consume_retries() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(rtu(&[1, 0x83, 6])),
        Step::Data(rtu(&[1, 0x83, 6])),
        Step::Data(good_reply()),
    ]);
    let config = cfg(1).with_slave_busy_uses_retry_count(true);
    let mut transport = ModbusTransport::rtu(stream.clone()).with_config(config);
    let resp = transport.unicast_message(&mut request()).await?;
    let Response::Exception(ex) = resp else {
        panic!("expected busy exception, got {resp:?}");
    };
    assert_eq!(ex.slave_exception_code(), 6);
    assert_eq!(stream.written().len(), 2);
    Ok(())
}

#[tokio::test]
async fn other_exceptions_are_returned() {
    let stream = ScriptedStream::new([Step::Data(rtu(&[1, 0x83, 2]))]);
    let mut master = ModbusMaster::new(ModbusTransport::rtu(stream.clone()).with_config(cfg(3)));
    let err = master.read_holding_registers(1, 0, 2).await.unwrap_err();
    assert!(matches!(
        err,
        ModbusError::SlaveException {
            function_code: 0x83,
            exception_code: 2,
            ..
        }
    ));
    assert_eq!(stream.written().len(), 1);
}

#[tokio::test]
async fn stale_transaction_is_skipped() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(mbap(3, &[1, 3, 4, 0, 1, 0, 2])),
        Step::Data(mbap(5, &[1, 3, 4, 0, 10, 0, 20])),
    ]);
    let mut transport =
        ModbusTransport::ip(stream.clone()).with_config(cfg(0).with_old_response_threshold(3));
    // burn ids 1..=4 so the request goes out as 5
    for _ in 0..4 {
        transport.get_new_transaction_id();
    }
    let mut req = request();
    let resp = transport.unicast_message(&mut req).await?.into_result()?;
    assert_eq!(req.transaction_id(), 5);
    assert_eq!(resp.transaction_id(), 5);
    assert_eq!(resp.data().as_slice(), &[10, 20]);
    assert_eq!(stream.written().len(), 1);
    Ok(())
}

#[tokio::test]
async fn zero_threshold_never_rereads_old_transaction() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(mbap(9, &[1, 3, 4, 0, 1, 0, 2])),
        Step::Data(mbap(11, &[1, 3, 4, 0, 10, 0, 20])),
    ]);
    let mut transport = ModbusTransport::ip(stream.clone()).with_config(cfg(1));
    for _ in 0..9 {
        transport.get_new_transaction_id();
    }
    let mut req = request();
    let resp = transport.unicast_message(&mut req).await?.into_result()?;
    assert_eq!(resp.data().as_slice(), &[10, 20]);
    // the reply to id 9 was a mismatch, so the request went out again as 11
    let written = stream.written();
    assert_eq!(written.len(), 2);
    assert_eq!(&written[0][..2], &[0, 10]);
    assert_eq!(&written[1][..2], &[0, 11]);
    Ok(())
}

#[tokio::test]
async fn wrong_transaction_id_is_resent() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([
        Step::Data(mbap(99, &[1, 3, 4, 0, 1, 0, 2])),
        Step::Data(mbap(2, &[1, 3, 4, 0, 10, 0, 20])),
    ]);
    let mut transport = ModbusTransport::ip(stream.clone()).with_config(cfg(1));
    let mut req = request();
    transport.unicast_message(&mut req).await?.into_result()?;
    let written = stream.written();
    assert_eq!(written.len(), 2);
    // every send gets a fresh id
    assert_eq!(&written[0][..2], &[0, 1]);
    assert_eq!(&written[1][..2], &[0, 2]);
    Ok(())
}

#[tokio::test]
async fn broadcast_write_does_not_wait() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([]);
    let mut master = ModbusMaster::new(ModbusTransport::rtu(stream.clone()).with_config(cfg(3)));
    master.write_single_register(0, 5, 0x1234).await?;
    assert_eq!(stream.written(), vec![rtu(&[0, 6, 0, 5, 0x12, 0x34])]);
    Ok(())
}

#[tokio::test]
async fn reads_cannot_broadcast() {
    let stream = ScriptedStream::new([]);
    let mut master = ModbusMaster::new(ModbusTransport::rtu(stream.clone()));
    assert!(matches!(
        master.read_coils(0, 0, 1).await,
        Err(ModbusError::Range(_))
    ));
    assert!(stream.written().is_empty());
}

#[tokio::test]
async fn read_coils_trims_padding() -> Result<(), ModbusError> {
    let stream = ScriptedStream::new([Step::Data(rtu(&[4, 1, 1, 0b1111_0101]))]);
    let mut master = ModbusMaster::new(ModbusTransport::rtu(stream).with_config(cfg(0)));
    assert_eq!(master.read_coils(4, 0, 3).await?, vec![true, false, true]);
    Ok(())
}

#[tokio::test]
async fn return_query_data_is_serial_only() {
    let stream = ScriptedStream::new([]);
    let mut master = ModbusMaster::new(ModbusTransport::ip(stream));
    assert!(matches!(
        master.return_query_data(1, 5).await,
        Err(ModbusError::Io(_))
    ));
}

#[tokio::test]
async fn request_limits_checked_before_io() {
    let stream = ScriptedStream::new([]);
    let mut master = ModbusMaster::new(ModbusTransport::rtu(stream.clone()));
    assert!(matches!(
        master.read_holding_registers(1, 0, 126).await,
        Err(ModbusError::Range(_))
    ));
    assert!(matches!(
        master.write_multiple_coils(1, 0, &[true; 2001]).await,
        Err(ModbusError::Range(_))
    ));
    assert!(stream.written().is_empty());
}

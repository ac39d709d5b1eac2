//! RTU framing: `address + PDU + CRC16` (low byte first), no delimiters.
//! Frame length is worked out from a fixed prefix and the function service.

use super::read_exact;
use crate::error::ModbusError;
use crate::function_services::FunctionServiceRegistry;
use crate::modbus_define::{
    EXCEPTION_OFFSET, RTU_REQUEST_FRAME_START_LENGTH, RTU_RESPONSE_FRAME_START_LENGTH,
};
use crate::stream::StreamResource;
use crate::utility::calculate_crc;

pub(super) const CHECKSUM_LEN: usize = 2;

pub(super) fn build_frame(message_frame: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message_frame.len() + CHECKSUM_LEN);
    frame.extend_from_slice(message_frame);
    frame.extend_from_slice(&calculate_crc(message_frame));
    frame
}

/// `frame` is the raw frame including its trailing CRC.
pub(super) fn checksums_match(message_frame: &[u8], frame: &[u8]) -> bool {
    frame.len() >= CHECKSUM_LEN && frame[frame.len() - CHECKSUM_LEN..] == calculate_crc(message_frame)
}

async fn read_rest<S: StreamResource>(
    stream: &mut S,
    mut frame: Vec<u8>,
    remaining: usize,
) -> Result<Vec<u8>, ModbusError> {
    let start = frame.len();
    frame.resize(start + remaining, 0);
    read_exact(stream, &mut frame[start..]).await?;
    Ok(frame)
}

/// One request frame, CRC included.
pub(super) async fn read_request<S: StreamResource>(
    stream: &mut S,
    registry: &FunctionServiceRegistry,
) -> Result<Vec<u8>, ModbusError> {
    let mut start = vec![0u8; RTU_REQUEST_FRAME_START_LENGTH];
    read_exact(stream, &mut start).await?;
    let remaining = registry.get(start[1])?.rtu_request_bytes_to_read(&start)?;
    read_rest(stream, start, remaining).await
}

/// One response frame, CRC included. Exception replies carry a single extra byte.
pub(super) async fn read_response<S: StreamResource>(
    stream: &mut S,
    registry: &FunctionServiceRegistry,
) -> Result<Vec<u8>, ModbusError> {
    let mut start = vec![0u8; RTU_RESPONSE_FRAME_START_LENGTH];
    read_exact(stream, &mut start).await?;
    let remaining = if start[1] > EXCEPTION_OFFSET {
        1
    } else {
        registry.get(start[1])?.rtu_response_bytes_to_read(&start)?
    };
    read_rest(stream, start, remaining).await
}

//! ASCII framing: `':' + hex(address + PDU) + hex(LRC) + "\r\n"`.

use crate::error::ModbusError;
use crate::modbus_define::{ASCII_START, MAX_FRAME_LEN, NEW_LINE};
use crate::stream::StreamResource;
use crate::utility::{calculate_lrc, get_ascii_bytes, hex_to_bytes};

pub(super) const CHECKSUM_LEN: usize = 1;

// ':' + two hex digits per byte + CRLF
const MAX_LINE_LEN: usize = 1 + 2 * MAX_FRAME_LEN + 2;

pub(super) fn build_frame(message_frame: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + 2 * (message_frame.len() + 1) + NEW_LINE.len());
    frame.push(ASCII_START);
    frame.extend_from_slice(&get_ascii_bytes(message_frame));
    frame.extend_from_slice(&get_ascii_bytes(&[calculate_lrc(message_frame)]));
    frame.extend_from_slice(NEW_LINE.as_bytes());
    frame
}

/// `frame` is the decoded frame including its trailing LRC byte.
pub(super) fn checksums_match(message_frame: &[u8], frame: &[u8]) -> bool {
    frame.last() == Some(&calculate_lrc(message_frame))
}

async fn read_line<S: StreamResource>(stream: &mut S) -> Result<Vec<u8>, ModbusError> {
    let mut line = Vec::new();
    let mut one = [0u8; 1];
    while !line.ends_with(NEW_LINE.as_bytes()) {
        if stream.read(&mut one).await? == 0 {
            return Err(ModbusError::peer_closed());
        }
        line.push(one[0]);
        if line.len() > MAX_LINE_LEN {
            return Err(ModbusError::format("ascii frame has no line terminator", line.len()));
        }
    }
    line.truncate(line.len() - NEW_LINE.len());
    Ok(line)
}

/// One frame decoded from hex, LRC included.
pub(super) async fn read_frame<S: StreamResource>(stream: &mut S) -> Result<Vec<u8>, ModbusError> {
    let line = read_line(stream).await?;
    let Some((&ASCII_START, body)) = line.split_first() else {
        return Err(ModbusError::format("ascii frame must start with ':'", line.len()));
    };
    let body = std::str::from_utf8(body)
        .map_err(|_| ModbusError::format("ascii frame is not valid text", line.len()))?;
    let frame = hex_to_bytes(body)?;
    if frame.len() < 3 {
        return Err(ModbusError::io("Premature end of stream, message truncated."));
    }
    Ok(frame)
}

//! MBAP framing for TCP and UDP:
//! `transaction id (BE) | protocol id 0 | length (BE, unit id + PDU) | unit id | PDU`.

use super::read_exact;
use crate::error::ModbusError;
use crate::modbus_define::{MAX_MBAP_LENGTH, MBAP_HEADER_LENGTH, MBAP_PROTOCOL_ID};
use crate::stream::StreamResource;
use crate::utility::be_u16;

/// Header plus unit id.
pub(super) fn mbap_header(transaction_id: u16, unit_id: u8, pdu_len: usize) -> Vec<u8> {
    // PDUs are bounded well below u16::MAX by the message model
    let length = u16::try_from(pdu_len + 1).unwrap_or(u16::MAX);
    let mut header = Vec::with_capacity(MBAP_HEADER_LENGTH + 1);
    header.extend_from_slice(&transaction_id.to_be_bytes());
    header.extend_from_slice(&MBAP_PROTOCOL_ID.to_be_bytes());
    header.extend_from_slice(&length.to_be_bytes());
    header.push(unit_id);
    header
}

pub(super) fn build_frame(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = mbap_header(transaction_id, unit_id, pdu.len());
    frame.extend_from_slice(pdu);
    frame
}

/// Read one ADU. Returns the transaction id and `unit id + PDU`.
pub(super) async fn read_frame<S: StreamResource>(
    stream: &mut S,
) -> Result<(u16, Vec<u8>), ModbusError> {
    let mut header = [0u8; MBAP_HEADER_LENGTH];
    read_exact(stream, &mut header).await?;
    let transaction_id = be_u16(&header, 0);
    let protocol_id = be_u16(&header, 2);
    let length = usize::from(be_u16(&header, 4));
    log::trace!("[MODBUS IP] MBAP header {header:?}, {length} bytes follow");
    if protocol_id != MBAP_PROTOCOL_ID {
        return Err(ModbusError::format(
            format!("MBAP protocol id {protocol_id} is not Modbus"),
            MBAP_HEADER_LENGTH,
        ));
    }
    if length < 2 || length > MAX_MBAP_LENGTH {
        return Err(ModbusError::format(
            format!("MBAP length field {length} out of range"),
            MBAP_HEADER_LENGTH,
        ));
    }
    let mut message_frame = vec![0u8; length];
    read_exact(stream, &mut message_frame).await?;
    Ok((transaction_id, message_frame))
}

//! Framing and the request/response state machine on top of a [`StreamResource`].
//!
//! One [`ModbusTransport`] serves all three encodings; [`Framing`] selects how a
//! message is put on the wire and how a frame is read back. The retry
//! algorithm in [`ModbusTransport::unicast_message`] is shared by all of them.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::{config as global_config, TransportConfig};
use crate::error::ModbusError;
use crate::exception_codes::SlaveExceptionCode;
use crate::function_services::FunctionServiceRegistry;
use crate::message::{
    FromFrame, ModbusMessage, ModbusRequest, Response, SlaveExceptionResponse,
};
use crate::stream::StreamResource;
use crate::utility::hex_dump;

mod ascii;
mod ip;
mod rtu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Rtu,
    Ascii,
    /// MBAP header, used over TCP and UDP.
    Ip,
}

impl Framing {
    #[must_use]
    pub const fn is_serial(self) -> bool {
        matches!(self, Self::Rtu | Self::Ascii)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Rtu => "RTU",
            Self::Ascii => "ASCII",
            Self::Ip => "IP",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Inbound {
    Request,
    Response,
}

/// An inbound frame with its envelope removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Slave address followed by the PDU; no checksum, no MBAP header.
    pub frame: Vec<u8>,
    /// MBAP transaction id; always 0 on serial framings.
    pub transaction_id: u16,
}

/// Transaction ids for one transport: 1, 2, ... 65535, then 1 again.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last: Mutex<u16>,
}

impl TransactionIdGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }

    pub fn next(&self) -> u16 {
        let mut last = self.last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *last = if *last == u16::MAX { 1 } else { *last + 1 };
        *last
    }
}

/// Outcome of one write/read round inside `unicast_message`.
enum Attempt<T> {
    Done(Response<T>),
    Busy(SlaveExceptionResponse),
}

/// Read `buf.len()` bytes; a zero-byte read means the peer went away.
pub(crate) async fn read_exact<S: StreamResource>(
    stream: &mut S,
    buf: &mut [u8],
) -> Result<(), ModbusError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ModbusError::peer_closed());
        }
        filled += n;
    }
    Ok(())
}

#[derive(Debug)]
pub struct ModbusTransport<S> {
    stream: S,
    framing: Framing,
    config: TransportConfig,
    transaction_ids: TransactionIdGenerator,
    registry: &'static FunctionServiceRegistry,
}

impl<S: StreamResource> ModbusTransport<S> {
    pub fn new(stream: S, framing: Framing) -> Self {
        let mut transport = Self {
            stream,
            framing,
            config: TransportConfig::default(),
            transaction_ids: TransactionIdGenerator::new(),
            registry: FunctionServiceRegistry::standard(),
        };
        transport.apply_timeouts();
        transport
    }

    pub fn rtu(stream: S) -> Self {
        Self::new(stream, Framing::Rtu)
    }

    pub fn ascii(stream: S) -> Self {
        Self::new(stream, Framing::Ascii)
    }

    pub fn ip(stream: S) -> Self {
        Self::new(stream, Framing::Ip)
    }

    #[must_use]
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Replace the settings; timeouts are pushed down to the stream.
    pub fn set_config(&mut self, config: TransportConfig) {
        self.config = config;
        self.apply_timeouts();
    }

    fn apply_timeouts(&mut self) {
        self.stream.set_read_timeout(self.config.read_timeout());
        self.stream.set_write_timeout(self.config.write_timeout());
    }

    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub const fn framing(&self) -> Framing {
        self.framing
    }

    pub const fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    pub fn get_new_transaction_id(&self) -> u16 {
        self.transaction_ids.next()
    }

    /// Full wire frame for `message` under this transport's framing.
    pub fn build_message_frame<M: ModbusMessage + ?Sized>(&self, message: &M) -> Vec<u8> {
        match self.framing {
            Framing::Rtu => rtu::build_frame(&message.message_frame()),
            Framing::Ascii => ascii::build_frame(&message.message_frame()),
            Framing::Ip => ip::build_frame(
                message.transaction_id(),
                message.slave_address(),
                &message.protocol_data_unit(),
            ),
        }
    }

    /// Whether the checksum trailing `frame` matches `message`. IP frames carry none.
    pub fn checksums_match<M: ModbusMessage + ?Sized>(&self, message: &M, frame: &[u8]) -> bool {
        match self.framing {
            Framing::Rtu => rtu::checksums_match(&message.message_frame(), frame),
            Framing::Ascii => ascii::checksums_match(&message.message_frame(), frame),
            Framing::Ip => true,
        }
    }

    fn log_frame(&self, direction: &str, frame: &[u8]) {
        if global_config().log_modbus_frames {
            log::debug!("[MODBUS {} {direction}] {}", self.framing.label(), hex_dump(frame));
        }
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        self.log_frame("send", frame);
        self.stream.write(frame).await
    }

    /// Send a request. IP assigns a fresh transaction id; serial lines drop stale input first.
    pub async fn write<M: ModbusMessage + ?Sized>(&mut self, message: &mut M) -> Result<(), ModbusError> {
        if self.framing.is_serial() {
            self.stream.discard_in_buffer().await?;
        } else {
            message.set_transaction_id(self.get_new_transaction_id());
        }
        let frame = self.build_message_frame(message);
        self.send_frame(&frame).await
    }

    /// Send a slave reply, keeping the transaction id copied from its request.
    pub async fn write_response<M: ModbusMessage + ?Sized>(&mut self, message: &M) -> Result<(), ModbusError> {
        let frame = self.build_message_frame(message);
        self.send_frame(&frame).await
    }

    pub async fn discard_in_buffer(&mut self) -> Result<(), ModbusError> {
        self.stream.discard_in_buffer().await
    }

    /// Strip and verify a serial checksum. `frame` is the raw frame with its checksum.
    fn strip_checksum(&self, mut frame: Vec<u8>) -> Result<Vec<u8>, ModbusError> {
        let checksum_len = match self.framing {
            Framing::Rtu => rtu::CHECKSUM_LEN,
            Framing::Ascii => ascii::CHECKSUM_LEN,
            Framing::Ip => return Ok(frame),
        };
        let body_len = frame.len().saturating_sub(checksum_len);
        if self.config.check_frame {
            let matches = match self.framing {
                Framing::Rtu => rtu::checksums_match(&frame[..body_len], &frame),
                _ => ascii::checksums_match(&frame[..body_len], &frame),
            };
            if !matches {
                let msg = format!(
                    "Checksums failed to match {} != {}",
                    hex_dump(&frame[..body_len]),
                    hex_dump(&frame)
                );
                log::warn!("[MODBUS {}] {msg}", self.framing.label());
                return Err(ModbusError::io(msg));
            }
        }
        frame.truncate(body_len);
        Ok(frame)
    }

    /// Read one raw request frame (slave side).
    pub async fn read_request(&mut self) -> Result<ReceivedFrame, ModbusError> {
        self.read_frame(Inbound::Request).await
    }

    async fn read_response_frame(&mut self) -> Result<ReceivedFrame, ModbusError> {
        self.read_frame(Inbound::Response).await
    }

    /// Read one frame and strip its envelope. Only RTU needs to know which
    /// side it is on, to size the frame from its prefix.
    async fn read_frame(&mut self, inbound: Inbound) -> Result<ReceivedFrame, ModbusError> {
        let (raw, transaction_id) = match (self.framing, inbound) {
            (Framing::Rtu, Inbound::Request) => (rtu::read_request(&mut self.stream, self.registry).await?, 0),
            (Framing::Rtu, Inbound::Response) => (rtu::read_response(&mut self.stream, self.registry).await?, 0),
            (Framing::Ascii, _) => (ascii::read_frame(&mut self.stream).await?, 0),
            (Framing::Ip, _) => {
                let (tid, frame) = ip::read_frame(&mut self.stream).await?;
                (frame, tid)
            }
        };
        self.log_frame("recv", &raw);
        Ok(ReceivedFrame {
            frame: self.strip_checksum(raw)?,
            transaction_id,
        })
    }

    /// Read and decode one response: the expected kind or a slave exception.
    pub async fn read_response<T>(&mut self) -> Result<Response<T>, ModbusError>
    where
        T: ModbusMessage + FromFrame,
    {
        let received = self.read_response_frame().await?;
        let mut response = Response::<T>::from_frame(&received.frame)?;
        response.as_message_mut().set_transaction_id(received.transaction_id);
        Ok(response)
    }

    /// Read and drop one response frame.
    pub async fn ignore_response(&mut self) -> Result<(), ModbusError> {
        let received = self.read_response_frame().await?;
        log::debug!("[MODBUS {}] ignored response {}", self.framing.label(), hex_dump(&received.frame));
        Ok(())
    }

    /// Function code and unit must match, then the request's own checks, then
    /// (IP) the transaction id. Any mismatch is an I/O-class error.
    pub fn validate_response<R: ModbusRequest>(
        &self,
        request: &R,
        response: &R::Response,
    ) -> Result<(), ModbusError> {
        if request.function_code() != response.function_code() {
            return Err(ModbusError::io(format!(
                "Received response with unexpected Function Code. Expected {}, received {}.",
                request.function_code(),
                response.function_code()
            )));
        }
        if request.slave_address() != response.slave_address() {
            return Err(ModbusError::io(format!(
                "Response slave address does not match request. Expected {}, received {}.",
                request.slave_address(),
                response.slave_address()
            )));
        }
        request.validate_response(response)?;
        if self.framing == Framing::Ip && request.transaction_id() != response.transaction_id() {
            return Err(ModbusError::io(format!(
                "Response was not of expected transaction ID. Expected {}, received {}.",
                request.transaction_id(),
                response.transaction_id()
            )));
        }
        Ok(())
    }

    /// A reply to an earlier request still in flight: re-read without re-sending.
    pub fn should_retry_response<Q, P>(&self, request: &Q, response: &P) -> bool
    where
        Q: ModbusMessage + ?Sized,
        P: ModbusMessage + ?Sized,
    {
        if request.function_code() != response.function_code()
            || request.slave_address() != response.slave_address()
        {
            return false;
        }
        let threshold = self.config.retry_on_old_response_threshold;
        self.framing == Framing::Ip
            && threshold > 0
            && request.transaction_id() > response.transaction_id()
            && request.transaction_id() - response.transaction_id() < threshold
    }

    async fn unicast_attempt<R: ModbusRequest>(
        &mut self,
        request: &mut R,
    ) -> Result<Attempt<R::Response>, ModbusError> {
        self.write(request).await?;
        loop {
            match self.read_response::<R::Response>().await? {
                Response::Exception(ex) => match ex.exception() {
                    Some(SlaveExceptionCode::Acknowledge) => {
                        log::debug!("[MODBUS] slave {} acknowledged, reading again", ex.slave_address());
                        sleep(self.config.wait_to_retry()).await;
                    }
                    Some(SlaveExceptionCode::SlaveDeviceBusy) => return Ok(Attempt::Busy(ex)),
                    _ => return Ok(Attempt::Done(Response::Exception(ex))),
                },
                Response::Data(data) => {
                    if self.should_retry_response(request, &data) {
                        log::debug!(
                            "[MODBUS] stale transaction id {} (expected {}), reading again",
                            data.transaction_id(),
                            request.transaction_id()
                        );
                        continue;
                    }
                    self.validate_response(request, &data)?;
                    return Ok(Attempt::Done(Response::Data(data)));
                }
            }
        }
    }

    /// Send `request` and wait for its reply, retrying I/O failures and timeouts.
    ///
    /// Slave exceptions other than Acknowledge/SlaveDeviceBusy come back as
    /// [`Response::Exception`]. Decode errors are never retried.
    pub async fn unicast_message<R: ModbusRequest>(
        &mut self,
        request: &mut R,
    ) -> Result<Response<R::Response>, ModbusError> {
        let retries = self.config.retries;
        let wait: Duration = self.config.wait_to_retry();
        let mut attempt = 1usize;
        loop {
            match self.unicast_attempt(request).await {
                Ok(Attempt::Done(response)) => return Ok(response),
                Ok(Attempt::Busy(ex)) => {
                    if self.config.slave_busy_uses_retry_count {
                        if attempt > retries {
                            return Ok(Response::Exception(ex));
                        }
                        attempt += 1;
                    }
                    log::debug!("[MODBUS] slave {} busy, waiting {wait:?}", ex.slave_address());
                    sleep(wait).await;
                }
                Err(e) if e.is_retryable() && attempt <= retries => {
                    log::warn!("[MODBUS RETRY] attempt {attempt}/{retries} for '{request}' failed: {e}");
                    attempt += 1;
                    sleep(wait).await;
                }
                Err(e) => {
                    if global_config().modbus_dump_on_error {
                        log::error!(
                            "[MODBUS ERROR] request={} frame={} err={}",
                            request,
                            hex_dump(&self.build_message_frame(request)),
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ReadCoilsInputsRequest, ReadCoilsInputsResponse, ReadHoldingInputRegistersResponse};
    use crate::stream::IoStreamAdapter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn duplex_transport(framing: Framing) -> (ModbusTransport<IoStreamAdapter<DuplexStream>>, DuplexStream) {
        let (a, b) = tokio::io::duplex(256);
        let cfg = TransportConfig::new()
            .with_retries(0)
            .with_wait_to_retry_ms(1)
            .with_read_timeout_ms(200);
        (ModbusTransport::new(IoStreamAdapter::new(a), framing).with_config(cfg), b)
    }

    #[test]
    fn transaction_ids_wrap_to_one() {
        let ids = TransactionIdGenerator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        *ids.last.lock().expect("lock") = u16::MAX - 1;
        assert_eq!(ids.next(), u16::MAX);
        assert_eq!(ids.next(), 1);
    }

    #[test]
    fn frames_per_encoding() {
        let req = ReadCoilsInputsRequest::new(1, 2, 0, 1).expect("req");
        let (t, _peer) = duplex_transport(Framing::Rtu);
        assert_eq!(t.build_message_frame(&req), vec![2, 1, 0, 0, 0, 1, 0xFD, 0xF9]);
        let (t, _peer) = duplex_transport(Framing::Ascii);
        assert_eq!(t.build_message_frame(&req), b":020100000001FC\r\n".to_vec());

        let req = ReadCoilsInputsRequest::new(1, 2, 10, 5).expect("req");
        let (t, _peer) = duplex_transport(Framing::Ip);
        assert_eq!(
            t.build_message_frame(&req),
            vec![0, 0, 0, 0, 0, 6, 2, 1, 0, 10, 0, 5]
        );
    }

    #[test]
    fn stale_response_detection() {
        let (mut t, _peer) = duplex_transport(Framing::Ip);
        t.set_config(t.config().clone().with_old_response_threshold(3));
        let mut req = ReadCoilsInputsRequest::new(1, 2, 0, 1).expect("req");
        req.set_transaction_id(10);
        let mut resp = ReadCoilsInputsResponse::new(1, 2, vec![true].into()).expect("resp");

        resp.set_transaction_id(8);
        assert!(t.should_retry_response(&req, &resp));
        resp.set_transaction_id(7);
        assert!(!t.should_retry_response(&req, &resp));
        resp.set_transaction_id(11);
        assert!(!t.should_retry_response(&req, &resp));

        // threshold 0 never re-reads, however close the old id
        t.set_config(t.config().clone().with_old_response_threshold(0));
        resp.set_transaction_id(9);
        assert!(!t.should_retry_response(&req, &resp));
        resp.set_transaction_id(1);
        assert!(!t.should_retry_response(&req, &resp));

        // different unit is a validation failure, not a stale reply
        let mut other = ReadCoilsInputsResponse::new(1, 3, vec![true].into()).expect("resp");
        other.set_transaction_id(9);
        assert!(!t.should_retry_response(&req, &other));
    }

    #[test]
    fn validation_messages() {
        let (t, _peer) = duplex_transport(Framing::Ip);
        let mut req = ReadCoilsInputsRequest::new(1, 2, 0, 1).expect("req");
        req.set_transaction_id(5);
        let mut resp = ReadCoilsInputsResponse::new(1, 2, vec![true].into()).expect("resp");
        resp.set_transaction_id(4);
        let err = t.validate_response(&req, &resp).unwrap_err();
        assert_eq!(
            err.to_string(),
            "IO error: Response was not of expected transaction ID. Expected 5, received 4."
        );
        resp.set_transaction_id(5);
        assert!(t.validate_response(&req, &resp).is_ok());

        let wrong_unit = ReadCoilsInputsResponse::new(1, 9, vec![true].into()).expect("resp");
        assert!(t.validate_response(&req, &wrong_unit).is_err());
    }

    #[tokio::test]
    async fn rtu_round_trip_over_duplex() -> Result<(), Box<dyn std::error::Error>> {
        let (mut t, mut peer) = duplex_transport(Framing::Rtu);
        let slave = tokio::spawn(async move {
            let mut req = [0u8; 8];
            peer.read_exact(&mut req).await.expect("request");
            assert_eq!(req, [2, 1, 0, 0, 0, 1, 0xFD, 0xF9]);
            let body = [2u8, 1, 1, 1];
            let mut frame = body.to_vec();
            frame.extend_from_slice(&crate::utility::calculate_crc(&body));
            peer.write_all(&frame).await.expect("response");
            peer
        });
        let mut req = ReadCoilsInputsRequest::new(1, 2, 0, 1)?;
        let resp = t.unicast_message(&mut req).await?.into_result()?;
        assert_eq!(resp.protocol_data_unit(), vec![1, 1, 1]);
        slave.await?;
        Ok(())
    }

    #[tokio::test]
    async fn rtu_bad_crc_is_io_error() -> Result<(), Box<dyn std::error::Error>> {
        let (mut t, mut peer) = duplex_transport(Framing::Rtu);
        peer.write_all(&[2, 1, 1, 1, 0, 0]).await?;
        let err = t.read_response::<ReadCoilsInputsResponse>().await.unwrap_err();
        assert!(matches!(err, ModbusError::Io(_)));
        assert!(err.to_string().contains("Checksums failed to match"));
        Ok(())
    }

    #[tokio::test]
    async fn rtu_check_frame_disabled() -> Result<(), Box<dyn std::error::Error>> {
        let (mut t, mut peer) = duplex_transport(Framing::Rtu);
        t.set_config(t.config().clone().with_check_frame(false));
        peer.write_all(&[2, 1, 1, 1, 0, 0]).await?;
        let resp = t.read_response::<ReadCoilsInputsResponse>().await?;
        assert!(matches!(resp, Response::Data(_)));
        Ok(())
    }

    #[tokio::test]
    async fn ip_request_carries_transaction_id() -> Result<(), Box<dyn std::error::Error>> {
        let (mut t, mut peer) = duplex_transport(Framing::Ip);
        peer.write_all(&[0, 45, 0, 0, 0, 6, 2, 1, 0, 10, 0, 5]).await?;
        let received = t.read_request().await?;
        assert_eq!(received.transaction_id, 45);
        assert_eq!(received.frame, vec![2, 1, 0, 10, 0, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn rtu_request_and_response_are_sized_per_side() -> Result<(), Box<dyn std::error::Error>> {
        let (mut t, mut peer) = duplex_transport(Framing::Rtu);
        // function 3 is sized differently as a request and as a reply
        let body = [2u8, 3, 0, 10, 0, 2];
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crate::utility::calculate_crc(&body));
        peer.write_all(&frame).await?;
        let received = t.read_request().await?;
        assert_eq!(received.frame, body.to_vec());
        assert_eq!(received.transaction_id, 0);

        let body = [2u8, 3, 4, 0, 1, 0, 2];
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crate::utility::calculate_crc(&body));
        peer.write_all(&frame).await?;
        let resp = t.read_response::<ReadHoldingInputRegistersResponse>().await?.into_result()?;
        assert_eq!(resp.data().as_slice(), &[1, 2]);
        Ok(())
    }
}

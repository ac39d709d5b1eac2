use std::io::ErrorKind;
use std::sync::Arc;

use tokio::sync::watch;

use super::slave::{exception_for, Slave, SlaveRegistry};
use crate::config::BroadcastFailurePolicy;
use crate::error::ModbusError;
use crate::function_services::FunctionServiceRegistry;
use crate::message::{Message, ModbusMessage, SlaveExceptionResponse};
use crate::modbus_define::BROADCAST_ADDRESS;
use crate::stream::StreamResource;
use crate::transport::{ModbusTransport, ReceivedFrame};

/// Serves every registered slave over one transport.
///
/// Requests for unknown units are ignored. Broadcasts (unit 0) are applied
/// to all slaves and never answered.
#[derive(Debug)]
pub struct SlaveNetwork<S> {
    transport: ModbusTransport<S>,
    registry: SlaveRegistry,
}

fn connection_lost(err: &ModbusError) -> bool {
    match err {
        ModbusError::Io(e) => matches!(
            e.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::NotConnected
        ),
        _ => false,
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    let requested = *shutdown.borrow();
    // a dropped sender also stops the loop
    requested || shutdown.has_changed().is_err()
}

impl<S: StreamResource> SlaveNetwork<S> {
    pub fn new(transport: ModbusTransport<S>) -> Self {
        Self::with_registry(transport, SlaveRegistry::new())
    }

    /// Serve the slaves of an existing registry, e.g. one shared by several connections.
    pub const fn with_registry(transport: ModbusTransport<S>, registry: SlaveRegistry) -> Self {
        Self {
            transport,
            registry,
        }
    }

    pub const fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    pub fn add_slave(&self, slave: Slave) -> Result<Arc<Slave>, ModbusError> {
        self.registry.add_slave(slave)
    }

    pub fn remove_slave(&self, unit_id: u8) -> Option<Arc<Slave>> {
        self.registry.remove_slave(unit_id)
    }

    pub fn get_slave(&self, unit_id: u8) -> Option<Arc<Slave>> {
        self.registry.get_slave(unit_id)
    }

    pub const fn transport(&self) -> &ModbusTransport<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut ModbusTransport<S> {
        &mut self.transport
    }

    /// Serve requests until `shutdown` turns true (checked between frames) or
    /// the peer closes the stream.
    pub async fn listen(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), ModbusError> {
        tracing::info!(framing = ?self.transport.framing(), "slave network listening");
        while !shutdown_requested(&shutdown) {
            let received = match self.transport.read_request().await {
                Ok(received) => received,
                Err(e) if connection_lost(&e) => {
                    tracing::info!("master closed the connection: {e}");
                    return Ok(());
                }
                Err(e) => {
                    if let Err(lost) = self.skip_frame(&e).await {
                        tracing::info!("connection lost while discarding input: {lost}");
                        return Ok(());
                    }
                    continue;
                }
            };
            match self.process_frame(received).await {
                Ok(()) => {}
                Err(e) if connection_lost(&e) => {
                    tracing::info!("connection lost while replying: {e}");
                    return Ok(());
                }
                Err(e) => tracing::warn!("failed to send reply: {e}"),
            }
        }
        tracing::info!("slave network stopped");
        Ok(())
    }

    /// Drop whatever is left of a frame that could not be read. A timeout may
    /// have cut a frame short, so it drains too; on an idle line that is a no-op.
    async fn skip_frame(&mut self, err: &ModbusError) -> Result<(), ModbusError> {
        if matches!(err, ModbusError::Timeout) {
            tracing::trace!("read timed out, draining partial input");
        } else {
            tracing::warn!("discarding unreadable frame: {err}");
        }
        match self.transport.discard_in_buffer().await {
            Ok(()) => Ok(()),
            Err(e) if connection_lost(&e) => Err(e),
            Err(e) => {
                tracing::debug!("discard failed: {e}");
                Ok(())
            }
        }
    }

    /// Decode one inbound frame, apply it and send the reply, if any.
    pub async fn process_frame(&mut self, received: ReceivedFrame) -> Result<(), ModbusError> {
        let request = FunctionServiceRegistry::standard().create_modbus_request(&received.frame);
        let response = match request {
            Ok(mut request) => {
                request.set_transaction_id(received.transaction_id);
                tracing::debug!(unit = request.slave_address(), "request: {request}");
                self.apply_request(&request)
            }
            Err(e) => self.reject_frame(&received.frame, &e),
        };
        let Some(mut response) = response else {
            return Ok(());
        };
        response.set_transaction_id(received.transaction_id);
        self.transport.write_response(&response).await
    }

    /// Reply for a frame that did not decode: an exception when the target unit
    /// exists and the failure is one a slave can report, otherwise nothing.
    fn reject_frame(&self, frame: &[u8], err: &ModbusError) -> Option<Message> {
        let reportable = matches!(
            err,
            ModbusError::UnsupportedFunction(_)
                | ModbusError::Range(_)
                | ModbusError::IllegalDataValue(_)
        );
        let (&unit_id, rest) = frame.split_first()?;
        let &function_code = rest.first()?;
        if !reportable || unit_id == BROADCAST_ADDRESS || self.registry.get_slave(unit_id).is_none() {
            tracing::warn!(frame_len = frame.len(), "ignoring undecodable frame: {err}");
            return None;
        }
        tracing::warn!(unit = unit_id, function_code, "rejecting request: {err}");
        Some(SlaveExceptionResponse::for_request(unit_id, function_code, exception_for(err)).into())
    }

    /// Apply a decoded request. Returns the reply to send, if any.
    pub fn apply_request(&self, request: &Message) -> Option<Message> {
        if request.slave_address() == BROADCAST_ADDRESS {
            self.apply_broadcast(request);
            return None;
        }
        match self.registry.get_slave(request.slave_address()) {
            Some(slave) => Some(slave.apply_request(request)),
            None => {
                tracing::debug!(unit = request.slave_address(), "ignoring request for unknown unit");
                None
            }
        }
    }

    fn apply_broadcast(&self, request: &Message) {
        let policy = self.transport.config().broadcast_failure_policy;
        for slave in self.registry.slaves() {
            let Err(e) = slave.execute(request) else {
                continue;
            };
            tracing::error!(unit = slave.unit_id(), "error applying broadcast request: {e}");
            if policy == BroadcastFailurePolicy::RemoveSlave {
                self.registry.remove_slave(slave.unit_id());
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ModbusError;
use crate::exception_codes::SlaveExceptionCode;
use crate::function_services::FunctionServiceRegistry;
use crate::message::{Message, ModbusMessage, SlaveExceptionResponse};
use crate::modbus_define::BROADCAST_ADDRESS;
use crate::point_store::SlaveDataStore;

/// One addressable unit and its point store.
#[derive(Debug)]
pub struct Slave {
    unit_id: u8,
    store: Arc<SlaveDataStore>,
}

/// Exception code a slave answers with when executing a request failed.
pub(crate) const fn exception_for(err: &ModbusError) -> SlaveExceptionCode {
    match err {
        ModbusError::IllegalDataAddress(_) => SlaveExceptionCode::IllegalDataAddress,
        ModbusError::IllegalDataValue(_) | ModbusError::Range(_) => {
            SlaveExceptionCode::IllegalDataValue
        }
        ModbusError::UnsupportedFunction(_) => SlaveExceptionCode::IllegalFunction,
        _ => SlaveExceptionCode::SlaveDeviceFailure,
    }
}

impl Slave {
    #[must_use]
    pub fn new(unit_id: u8) -> Self {
        Self::with_store(unit_id, Arc::new(SlaveDataStore::new()))
    }

    #[must_use]
    pub const fn with_store(unit_id: u8, store: Arc<SlaveDataStore>) -> Self {
        Self { unit_id, store }
    }

    #[must_use]
    pub const fn unit_id(&self) -> u8 {
        self.unit_id
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<SlaveDataStore> {
        &self.store
    }

    /// Run `request` against the store; failures are returned as errors.
    pub fn execute(&self, request: &Message) -> Result<Message, ModbusError> {
        FunctionServiceRegistry::standard()
            .get(request.function_code())?
            .handle(request, &self.store)
    }

    /// Run `request` and always produce a reply: the service's response, or a
    /// slave exception describing why it failed.
    #[must_use]
    pub fn apply_request(&self, request: &Message) -> Message {
        match self.execute(request) {
            Ok(response) => response,
            Err(e) => {
                let code = exception_for(&e);
                tracing::warn!(
                    unit = self.unit_id,
                    function_code = request.function_code(),
                    exception = code.code(),
                    "request failed: {e}"
                );
                SlaveExceptionResponse::for_request(self.unit_id, request.function_code(), code).into()
            }
        }
    }
}

/// Unit id -> slave map shared between a slave network and its owners.
///
/// Cloning is cheap and every clone sees the same slaves, so units can be
/// added or removed while a network is listening.
#[derive(Debug, Clone, Default)]
pub struct SlaveRegistry {
    slaves: Arc<RwLock<HashMap<u8, Arc<Slave>>>>,
}

impl SlaveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slave`. Unit 0 is reserved for broadcast; ids must be unique.
    pub fn add_slave(&self, slave: Slave) -> Result<Arc<Slave>, ModbusError> {
        if slave.unit_id == BROADCAST_ADDRESS {
            return Err(ModbusError::Range(
                "unit id 0 is the broadcast address".into(),
            ));
        }
        let mut map = self.slaves.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&slave.unit_id) {
            return Err(ModbusError::AlreadyRegistered);
        }
        let unit_id = slave.unit_id;
        let slave = Arc::new(slave);
        map.insert(unit_id, Arc::clone(&slave));
        tracing::info!(unit = unit_id, "slave added to slave network");
        Ok(slave)
    }

    pub fn remove_slave(&self, unit_id: u8) -> Option<Arc<Slave>> {
        let removed = self
            .slaves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&unit_id);
        if removed.is_some() {
            tracing::info!(unit = unit_id, "slave removed from slave network");
        }
        removed
    }

    #[must_use]
    pub fn get_slave(&self, unit_id: u8) -> Option<Arc<Slave>> {
        self.slaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&unit_id)
            .cloned()
    }

    #[must_use]
    pub fn unit_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .slaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Every registered slave, ordered by unit id.
    #[must_use]
    pub fn slaves(&self) -> Vec<Arc<Slave>> {
        let mut all: Vec<Arc<Slave>> = self
            .slaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_unstable_by_key(|s| s.unit_id);
        all
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slaves.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

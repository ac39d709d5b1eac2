//! Slave exception codes and their descriptions.
//!
//! Descriptions come from a TOML table (`exception_codes.toml` is embedded and
//! loaded by [`crate::init_defaults`]); applications can merge their own
//! vendor-specific codes with `ExceptionRegistry::from_str(...).register_or_merge()`.
//! Without a registry the built-in text of [`SlaveExceptionCode`] is used.

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use crate::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SlaveExceptionCode {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
    SlaveDeviceFailure = 4,
    Acknowledge = 5,
    SlaveDeviceBusy = 6,
    MemoryParityError = 8,
    GatewayPathUnavailable = 10,
    GatewayTargetDeviceFailedToRespond = 11,
}

impl SlaveExceptionCode {
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::SlaveDeviceFailure,
            5 => Self::Acknowledge,
            6 => Self::SlaveDeviceBusy,
            8 => Self::MemoryParityError,
            10 => Self::GatewayPathUnavailable,
            11 => Self::GatewayTargetDeviceFailedToRespond,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    const fn builtin_description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Function code received in the query is not recognized or allowed by slave.",
            Self::IllegalDataAddress => "Data address of some or all the required entities are not allowed or do not exist in slave.",
            Self::IllegalDataValue => "Value is not accepted by slave.",
            Self::SlaveDeviceFailure => "Unrecoverable error occurred while slave was attempting to perform requested action.",
            Self::Acknowledge => "Slave has accepted request and is processing it, but a long duration of time is required.",
            Self::SlaveDeviceBusy => "Slave is engaged in processing a long-duration command. Master should retry later.",
            Self::MemoryParityError => "Slave detected a parity error in memory.",
            Self::GatewayPathUnavailable => "Specialized for Modbus gateways. Indicates a misconfigured gateway.",
            Self::GatewayTargetDeviceFailedToRespond => "Specialized for Modbus gateways. Sent when slave fails to respond.",
        }
    }
}

impl From<SlaveExceptionCode> for u8 {
    fn from(c: SlaveExceptionCode) -> Self {
        c.code()
    }
}

/// Coarse grouping used by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ExceptionCategory {
    Request,
    Device,
    Busy,
    Gateway,
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ExceptionCodeEntry {
    #[serde(deserialize_with = "parse_hex_or_int")]
    code: u8,
    name: Option<String>,
    description: Option<String>,
    category: Option<ExceptionCategory>,
}

// integer or "0x.." string
fn parse_hex_or_int<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;
    impl serde::de::Visitor<'_> for V {
        type Value = u8;
        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "hex string like 0xNN or integer")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u8::try_from(v).map_err(|_| E::custom(format!("value out of range: {v}")))
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u8::try_from(v).map_err(|_| E::custom(format!("value out of range: {v}")))
        }
        fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let s = s.trim();
            s.strip_prefix("0x").map_or_else(
                || s.parse::<u8>().map_err(|e| E::custom(format!("parse int: {e}"))),
                |h| u8::from_str_radix(h, 16).map_err(|e| E::custom(format!("parse hex: {e}"))),
            )
        }
    }
    deserializer.deserialize_any(V)
}

#[derive(Debug, Deserialize)]
struct ExceptionCodesToml {
    #[serde(default)]
    codes: Vec<ExceptionCodeEntry>,
}

#[derive(Clone, Debug)]
pub struct ExceptionEntryOwned {
    pub code: u8,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ExceptionCategory>,
}

impl From<&ExceptionCodeEntry> for ExceptionEntryOwned {
    fn from(e: &ExceptionCodeEntry) -> Self {
        Self {
            code: e.code,
            name: e.name.clone(),
            description: e.description.clone(),
            category: e.category,
        }
    }
}

/// In-memory handle for a parsed exception-codes TOML.
pub struct ExceptionRegistry {
    codes: Vec<ExceptionCodeEntry>,
}

impl ExceptionRegistry {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ModbusError> {
        let parsed: ExceptionCodesToml = toml::from_str(s)
            .map_err(|e| ModbusError::Config(format!("exception_codes.toml parse error: {e}")))?;
        Ok(Self {
            codes: parsed.codes,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ModbusError> {
        let s = fs::read_to_string(path)
            .map_err(|e| ModbusError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_str(&s)
    }

    /// Embedded default table.
    pub fn embedded() -> Result<Self, ModbusError> {
        Self::from_str(include_str!("exception_codes.toml"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Set the global registry; fails with `AlreadyRegistered` if it is already set.
    pub fn register_codes(&self) -> Result<(), ModbusError> {
        let map = self
            .codes
            .iter()
            .map(|e| (e.code, ExceptionEntryOwned::from(e)))
            .collect();
        EXCEPTION_REGISTRY
            .set(RwLock::new(map))
            .map_err(|_| ModbusError::AlreadyRegistered)
    }

    /// Set the global registry, or merge into it when it already exists.
    pub fn register_or_merge(&self) -> Result<(), ModbusError> {
        match self.register_codes() {
            Ok(()) => Ok(()),
            Err(ModbusError::AlreadyRegistered) => {
                let cell = EXCEPTION_REGISTRY.get().ok_or_else(|| {
                    ModbusError::Protocol("exception registry inconsistent state".into())
                })?;
                let mut w = cell
                    .write()
                    .map_err(|_| ModbusError::Protocol("exception registry poisoned".into()))?;
                for e in &self.codes {
                    w.insert(e.code, ExceptionEntryOwned::from(e));
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::str::FromStr for ExceptionRegistry {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

static EXCEPTION_REGISTRY: OnceCell<RwLock<HashMap<u8, ExceptionEntryOwned>>> = OnceCell::new();

fn get_global_registry(
) -> Option<std::sync::RwLockReadGuard<'static, HashMap<u8, ExceptionEntryOwned>>> {
    EXCEPTION_REGISTRY.get().and_then(|rw| rw.read().ok())
}

/// Registered description, falling back to the built-in text for standard codes.
#[must_use]
pub fn code_description(code: u8) -> Option<String> {
    get_global_registry()
        .and_then(|map| map.get(&code).and_then(|e| e.description.clone()))
        .or_else(|| SlaveExceptionCode::from_code(code).map(|c| c.builtin_description().to_string()))
}

#[must_use]
pub fn code_name(code: u8) -> Option<String> {
    get_global_registry()
        .and_then(|map| map.get(&code).and_then(|e| e.name.clone()))
        .or_else(|| SlaveExceptionCode::from_code(code).map(|c| format!("{c:?}")))
}

#[must_use]
pub fn code_category(code: u8) -> ExceptionCategory {
    get_global_registry()
        .and_then(|map| map.get(&code).and_then(|e| e.category))
        .unwrap_or(ExceptionCategory::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_table_parses() {
        let reg = ExceptionRegistry::embedded().expect("embedded table");
        assert_eq!(reg.len(), 9);
    }

    #[test]
    fn merge_vendor_code() {
        ExceptionRegistry::embedded()
            .expect("embedded")
            .register_or_merge()
            .expect("register");
        let toml = r#"
[[codes]]
code = "0x80"
name = "VendorOverTemperature"
description = "Drive reports over-temperature."
category = "Device"
"#;
        ExceptionRegistry::from_str(toml)
            .expect("parse toml")
            .register_or_merge()
            .expect("merge");
        assert_eq!(code_name(0x80), Some("VendorOverTemperature".into()));
        assert_eq!(code_category(0x80), ExceptionCategory::Device);
        assert_eq!(code_category(6), ExceptionCategory::Busy);
        assert!(code_description(2)
            .expect("description for 2")
            .contains("Data address"));
    }

    #[test]
    fn unknown_code() {
        assert_eq!(code_description(0x7E), None);
        assert_eq!(SlaveExceptionCode::from_code(7), None);
        assert_eq!(
            SlaveExceptionCode::from_code(6),
            Some(SlaveExceptionCode::SlaveDeviceBusy)
        );
    }

    #[test]
    fn out_of_range_code_rejected() {
        let err = ExceptionRegistry::from_str("[[codes]]\ncode = 300\n");
        assert!(matches!(err, Err(ModbusError::Config(_))));
    }
}

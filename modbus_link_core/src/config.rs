use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ModbusError;

#[derive(Debug)]
pub struct Config {
    pub modbus_retries: usize,
    pub modbus_wait_to_retry_ms: u64,
    pub modbus_read_timeout_ms: u64,
    pub modbus_write_timeout_ms: u64,
    pub modbus_old_response_threshold: u16,
    pub modbus_dump_on_error: bool,
    pub log_modbus_frames: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    fn from_env() -> Self {
        Self {
            modbus_retries: env_or("MODBUS_RETRIES", 3usize),
            modbus_wait_to_retry_ms: env_or("MODBUS_WAIT_TO_RETRY_MS", 250u64),
            modbus_read_timeout_ms: env_or("MODBUS_READ_TIMEOUT_MS", 1000u64),
            modbus_write_timeout_ms: env_or("MODBUS_WRITE_TIMEOUT_MS", 1000u64),
            modbus_old_response_threshold: env_or("MODBUS_OLD_RESPONSE_THRESHOLD", 0u16),
            modbus_dump_on_error: std::env::var("MODBUS_DUMP_ON_ERROR")
                .map(|v| v == "1")
                .unwrap_or(false),
            log_modbus_frames: std::env::var("MODBUS_LOG_FRAMES")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

/// Global config loaded once from environment at first access.
pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// Convenience accessor
pub fn config() -> &'static Config {
    &GLOBAL_CONFIG
}

/// What the slave network does with a slave whose handler failed during a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastFailurePolicy {
    /// Log the failure and keep the slave registered.
    #[default]
    LogAndKeep,
    /// Log the failure and unregister the slave.
    RemoveSlave,
}

/// Per-transport retry and timeout settings.
///
/// Missing fields fall back to the process-wide [`config()`] values, so a TOML
/// table only needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Re-send attempts after the first failure.
    pub retries: usize,
    pub wait_to_retry_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// IP only: a response this many ids older than the request is treated as stale and re-read.
    pub retry_on_old_response_threshold: u16,
    pub slave_busy_uses_retry_count: bool,
    /// Serial only: verify CRC/LRC of inbound frames.
    pub check_frame: bool,
    pub broadcast_failure_policy: BroadcastFailurePolicy,
}

impl TransportConfig {
    #[must_use]
    pub fn new() -> Self {
        let g = config();
        Self {
            retries: g.modbus_retries,
            wait_to_retry_ms: g.modbus_wait_to_retry_ms,
            read_timeout_ms: g.modbus_read_timeout_ms,
            write_timeout_ms: g.modbus_write_timeout_ms,
            retry_on_old_response_threshold: g.modbus_old_response_threshold,
            slave_busy_uses_retry_count: false,
            check_frame: true,
            broadcast_failure_policy: BroadcastFailurePolicy::LogAndKeep,
        }
    }

    /// Parse a TOML table (e.g. a `[transport]` section extracted by the caller).
    pub fn from_toml_str(s: &str) -> Result<Self, ModbusError> {
        toml::from_str(s).map_err(|e| ModbusError::Config(format!("transport config: {e}")))
    }

    #[must_use]
    pub const fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }
    #[must_use]
    pub const fn with_wait_to_retry_ms(mut self, ms: u64) -> Self {
        self.wait_to_retry_ms = ms;
        self
    }
    #[must_use]
    pub const fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }
    #[must_use]
    pub const fn with_write_timeout_ms(mut self, ms: u64) -> Self {
        self.write_timeout_ms = ms;
        self
    }
    #[must_use]
    pub const fn with_old_response_threshold(mut self, threshold: u16) -> Self {
        self.retry_on_old_response_threshold = threshold;
        self
    }
    #[must_use]
    pub const fn with_slave_busy_uses_retry_count(mut self, v: bool) -> Self {
        self.slave_busy_uses_retry_count = v;
        self
    }
    #[must_use]
    pub const fn with_check_frame(mut self, v: bool) -> Self {
        self.check_frame = v;
        self
    }
    #[must_use]
    pub const fn with_broadcast_failure_policy(mut self, p: BroadcastFailurePolicy) -> Self {
        self.broadcast_failure_policy = p;
        self
    }

    #[must_use]
    pub const fn wait_to_retry(&self) -> Duration {
        Duration::from_millis(self.wait_to_retry_ms)
    }
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

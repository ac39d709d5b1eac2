use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModbusError {
    /// Malformed or undersized frame. `frame_len` is the length of the frame that failed to decode.
    #[error("malformed frame ({frame_len} bytes): {reason}")]
    Format { reason: String, frame_len: usize },

    /// Point count or value outside the protocol limits, raised before any I/O.
    #[error("argument out of range: {0}")]
    Range(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("unsupported function code {0}")]
    UnsupportedFunction(u8),

    /// Negative response from a remote unit, surfaced by the master facade.
    #[error("slave exception: function code {function_code}, exception code {exception_code} ({description})")]
    SlaveException {
        function_code: u8,
        exception_code: u8,
        description: String,
    },

    #[error("illegal data address: {0}")]
    IllegalDataAddress(String),

    #[error("illegal data value: {0}")]
    IllegalDataValue(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("already registered")]
    AlreadyRegistered,
}

pub type ModbusResult<T> = Result<T, ModbusError>;

impl ModbusError {
    pub fn format(reason: impl Into<String>, frame_len: usize) -> Self {
        Self::Format {
            reason: reason.into(),
            frame_len,
        }
    }

    /// I/O-class failure built from a message (checksum mismatch, stale transaction id, ...).
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }

    /// Zero-byte read: the peer closed the stream.
    pub fn peer_closed() -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Read resulted in 0 bytes returned.",
        ))
    }

    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }

    /// Errors the transport retry loop may re-send for.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout)
    }

    /// Map a tokio timeout elapse or a `TimedOut` io error onto `Timeout`.
    pub(crate) fn from_io_timeout(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Io(e)
        }
    }
}

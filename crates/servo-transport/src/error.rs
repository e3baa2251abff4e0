use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("operation not supported on this backend: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("no response from servo {0}")]
    NoResponse(u8),
    #[error("unknown parameter: {0}")]
    UnknownParam(String),
    #[error("invalid value for {param}: {value}")]
    InvalidValue { param: String, value: String },
    #[error("invalid servo id: {0} (expected 1..=253)")]
    InvalidId(u8),
    #[error("bus disconnected")]
    Disconnected,
}

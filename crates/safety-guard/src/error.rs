use thiserror::Error;

pub type Result<T, E = SafetyError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyError {
    #[error("invalid registration for {0}: empty path")]
    EmptyPath(String),
    #[error("disarm failed for {component}: {reason}")]
    DisarmFailed { component: String, reason: String },
    #[error("disarm timed out for {0}")]
    DisarmTimeout(String),
    #[error("cannot arm while in error state; reset first")]
    ArmRejected,
}

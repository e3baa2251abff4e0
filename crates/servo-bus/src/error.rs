use crate::topology::JointKind;
use safety_guard::SafetyError;
use servo_transport::{ServoId, TransportError};
use thiserror::Error;

pub type Result<T, E = ControllerError> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to open transport: {0}")]
    Startup(TransportError),
    #[error("safety registration failed: {0}")]
    Safety(#[from] SafetyError),
    #[error("metrics setup failed: {0}")]
    Metrics(String),
    #[error("controller is not running")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActuatorError {
    #[error("joint not found: {0}")]
    JointNotFound(String),
    #[error("unsupported joint type for {joint}: {kind:?}")]
    UnsupportedJointType { joint: String, kind: JointKind },
    #[error("joint {0} has no limits")]
    MissingLimits(String),
    #[error("joint {0} has no lower limit")]
    MissingLowerLimit(String),
    #[error("joint {0} has no upper limit")]
    MissingUpperLimit(String),
    #[error("joint {0} has no positive velocity limit")]
    MissingVelocityLimit(String),
    #[error("joint {joint}: lower limit {lower} exceeds upper limit {upper}")]
    InvalidLimits { joint: String, lower: f64, upper: f64 },
    #[error("invalid device id {0} (expected 1..=253)")]
    InvalidDeviceId(u8),
    #[error("joint {joint}: position {position} is not a number")]
    InvalidCommand { joint: String, position: f64 },
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("safety registration failed: {0}")]
    Safety(#[from] SafetyError),
    #[error("actuator for {0} has stopped")]
    Stopped(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("invalid parameter id: {0} (expected <1..253>:<name>)")]
    InvalidParamId(String),
    #[error("unknown parameter: {0}")]
    UnknownParam(String),
    #[error("parameter is read-only: {0}")]
    ReadOnly(String),
    #[error("torque must be disabled on servo {id} to write {param}")]
    TorqueMustBeDisabled { id: ServoId, param: String },
    #[error("torque state of servo {0} could not be read")]
    TorqueStateUnknown(ServoId),
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),
}

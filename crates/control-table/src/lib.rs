//! control-table: register metadata for serial servo families
//!
//! Every named register of a control table is classified as `info` (read-only
//! identification), `config` (persisted settings that can only be written with
//! torque disabled) or `control` (writable at runtime). Live status registers and
//! indirect-addressing registers are deliberately left out of all three.

mod types;
pub use types::{
    Category, ControlTable, ParamDescriptor, StatusRegisters, UnknownControlTable, UnknownParam,
};

mod tables;
pub use tables::{
    is_excluded, is_writable, list_params, param_info, requires_torque_off, status_registers,
    INDIRECT_PREFIX,
};

mod alerts;
pub use alerts::HardwareAlert;

/// Register names shared by every supported family.
pub const TORQUE_ENABLE: &str = "torque_enable";
pub const GOAL_POSITION: &str = "goal_position";
pub const PRESENT_POSITION: &str = "present_position";

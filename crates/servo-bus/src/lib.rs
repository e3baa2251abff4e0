//! servo-bus: serial servo control on a shared half-duplex bus
//!
//! A single [`Controller`] task owns the bus transport and sequences all access
//! to it. Around it:
//! - [`start_actuator`] runs one command pipeline per joint
//! - [`Bridge`] exposes servo parameters as `"<id>:<name>"` with catalog checks
//! - [`LocalEventBus`] carries joint state, servo status and motion events
//! - the safety system receives a fresh disarm snapshot on every registry change

pub mod mapping;

mod config;
pub use config::{ActuatorOptions, BridgeOptions, ControllerOptions, DisarmAction, TorqueCheck};

mod error;
pub use error::{ActuatorError, BridgeError, ControllerError, Result};

pub mod messages;
pub use messages::{
    BeginMotion, CommandType, Envelope, JointState, Payload, PositionCommand, ServoStatus,
};

mod pubsub;
pub use pubsub::{path, EventBus, LocalEventBus};

mod topology;
pub use topology::{
    load_description_file, parse_description, JointKind, JointLimits, JointSource, JointSpec,
    RobotDescription,
};

mod metrics;
pub use metrics::{BusMetrics, MetricsHub};

mod controller;
pub use controller::{
    Controller, ControllerHandle, DisarmSnapshot, ServoRegistration, StatusSnapshot,
};

mod actuator;
pub use actuator::{resolve_joint, start_actuator, ActuatorHandle, ResolvedJoint};

mod bridge;
pub use bridge::{parse_param_id, Bridge, ParamEntry};

use control_table::HardwareAlert;
use safety_guard::StateTransition;
use serde::{Deserialize, Serialize};
use servo_transport::ServoId;
use time::OffsetDateTime;
use uuid::Uuid;

/// Joint feedback; one entry per named joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub efforts: Vec<f64>,
}

impl JointState {
    /// Position-only feedback for one joint.
    pub fn position(name: &str, position: f64) -> Self {
        Self {
            names: vec![name.to_string()],
            positions: vec![position],
            velocities: Vec::new(),
            efforts: Vec::new(),
        }
    }
}

/// Health telemetry of one servo. `None` marks a reading that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoStatus {
    pub device_id: ServoId,
    pub joint: Option<String>,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub hardware_error: Option<u8>,
    pub alerts: Vec<HardwareAlert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Position,
}

/// Emitted when an actuator forwards a new goal to its servo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginMotion {
    pub initial_position: f64,
    pub target_position: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub expected_arrival: OffsetDateTime,
    pub command_id: Option<Uuid>,
    pub command_type: CommandType,
}

/// Goal angle for one joint, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionCommand {
    pub position: f64,
    #[serde(default)]
    pub command_id: Option<Uuid>,
}

impl PositionCommand {
    pub fn new(position: f64) -> Self {
        Self {
            position,
            command_id: None,
        }
    }

    pub fn with_id(position: f64, command_id: Uuid) -> Self {
        Self {
            position,
            command_id: Some(command_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    JointState(JointState),
    ServoStatus(ServoStatus),
    BeginMotion(BeginMotion),
    PositionCommand(PositionCommand),
    StateTransition(StateTransition),
}

/// A payload as delivered by the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub path: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_json_is_tagged() {
        let p = Payload::PositionCommand(PositionCommand::new(0.25));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "position_command");
        assert_eq!(json["position"], 0.25);

        let back: Payload =
            serde_json::from_str(r#"{"type":"position_command","position":-1.5}"#).unwrap();
        assert_eq!(back, Payload::PositionCommand(PositionCommand::new(-1.5)));
    }

    #[test]
    fn status_serializes_alert_names() {
        let status = ServoStatus {
            device_id: ServoId::new(7).unwrap(),
            joint: Some("wrist".into()),
            temperature: Some(41.0),
            voltage: None,
            current: Some(0.2),
            hardware_error: Some(0b0010_0000),
            alerts: HardwareAlert::decode(0b0010_0000),
        };
        let json = serde_json::to_value(Payload::ServoStatus(status)).unwrap();
        assert_eq!(json["device_id"], 7);
        assert_eq!(json["alerts"][0], "overload");
        assert!(json["voltage"].is_null());
    }
}

use crate::error::ActuatorError;
use control_table::ControlTable;
use serde::{Deserialize, Serialize};
use servo_transport::ServoId;
use std::time::Duration;

/// What the safety system does to the servos when the robot is disarmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisarmAction {
    /// Bulk-disable torque so every servo freewheels
    #[default]
    DisableTorque,
    /// Leave the servos holding their last goal
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Robot name used when reporting to the safety system
    pub robot: String,
    /// Controller name; second element of every sensor path
    pub name: String,
    pub port: String,
    pub baud_rate: u32,
    pub control_table: ControlTable,
    pub poll_interval_ms: u64,
    /// 0 disables status polling
    pub status_poll_interval_ms: u64,
    pub disarm_action: DisarmAction,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            robot: "robot".to_string(),
            name: "servo_bus".to_string(),
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 1_000_000,
            control_table: ControlTable::default(),
            poll_interval_ms: 50,
            status_poll_interval_ms: 1000,
            disarm_action: DisarmAction::default(),
        }
    }
}

impl ControllerOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_poll_interval_ms > 0).then(|| Duration::from_millis(self.status_poll_interval_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorOptions {
    pub device_id: ServoId,
    /// Joint driven by this servo
    pub joint: String,
    #[serde(default)]
    pub reverse: bool,
    /// Minimum position change, in raw units, worth publishing
    #[serde(default = "default_deadband")]
    pub position_deadband: u32,
}

fn default_deadband() -> u32 {
    2
}

impl ActuatorOptions {
    pub fn new(device_id: ServoId, joint: impl Into<String>) -> Self {
        Self {
            device_id,
            joint: joint.into(),
            reverse: false,
            position_deadband: default_deadband(),
        }
    }

    /// Like [`ActuatorOptions::new`] for an id that has not been validated yet.
    pub fn with_raw_id(device_id: u8, joint: impl Into<String>) -> Result<Self, ActuatorError> {
        let id = ServoId::new(device_id).ok_or(ActuatorError::InvalidDeviceId(device_id))?;
        Ok(Self::new(id, joint))
    }
}

/// How a failed torque-state read is treated before writing a parameter that
/// needs torque off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorqueCheck {
    /// Proceed as if torque were disabled
    #[default]
    AssumeDisabled,
    /// Refuse the write
    Reject,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    pub torque_check: TorqueCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_defaults() {
        let opts: ControllerOptions = serde_yaml::from_str("port: mock").unwrap();
        assert_eq!(opts.port, "mock");
        assert_eq!(opts.poll_interval_ms, 50);
        assert_eq!(opts.status_poll_interval_ms, 1000);
        assert_eq!(opts.disarm_action, DisarmAction::DisableTorque);
        assert_eq!(opts.control_table, ControlTable::XSeries);
        assert_eq!(opts.status_interval(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn zero_status_interval_disables_loop() {
        let opts: ControllerOptions =
            serde_yaml::from_str("status_poll_interval_ms: 0\ndisarm_action: hold").unwrap();
        assert_eq!(opts.status_interval(), None);
        assert_eq!(opts.disarm_action, DisarmAction::Hold);
    }

    #[test]
    fn actuator_defaults_and_id_validation() {
        let opts: ActuatorOptions = serde_yaml::from_str("device_id: 3\njoint: elbow").unwrap();
        assert_eq!(opts.device_id.raw(), 3);
        assert!(!opts.reverse);
        assert_eq!(opts.position_deadband, 2);

        assert!(serde_yaml::from_str::<ActuatorOptions>("device_id: 0\njoint: elbow").is_err());
        assert!(serde_yaml::from_str::<ActuatorOptions>("device_id: 254\njoint: elbow").is_err());
        assert_eq!(
            ActuatorOptions::with_raw_id(0, "elbow").err(),
            Some(ActuatorError::InvalidDeviceId(0))
        );
        assert_eq!(ActuatorOptions::with_raw_id(253, "elbow").unwrap().device_id.raw(), 253);
    }
}

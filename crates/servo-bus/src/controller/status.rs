use crate::messages::ServoStatus;
use control_table::HardwareAlert;
use servo_transport::ServoId;

pub const TEMPERATURE_THRESHOLD: f64 = 1.0;
pub const VOLTAGE_THRESHOLD: f64 = 0.1;
pub const CURRENT_THRESHOLD: f64 = 0.01;

/// Absorbs rounding in differences of decimal readings such as 12.1 - 12.0.
const EPSILON: f64 = 1e-9;

/// Last published telemetry of one servo, used only for change detection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusSnapshot {
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub hardware_error: Option<u8>,
}

fn moved(new: Option<f64>, old: Option<f64>, threshold: f64) -> bool {
    match (new, old) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(n), Some(o)) => (n - o).abs() + EPSILON >= threshold,
    }
}

impl StatusSnapshot {
    pub fn is_unknown(&self) -> bool {
        self.temperature.is_none()
            && self.voltage.is_none()
            && self.current.is_none()
            && self.hardware_error.is_none()
    }

    /// Unknown readings never count as a change on their own.
    pub fn changed_from(&self, previous: Option<&StatusSnapshot>) -> bool {
        let Some(prev) = previous else {
            return true;
        };
        moved(self.temperature, prev.temperature, TEMPERATURE_THRESHOLD)
            || moved(self.voltage, prev.voltage, VOLTAGE_THRESHOLD)
            || moved(self.current, prev.current, CURRENT_THRESHOLD)
            || matches!(self.hardware_error, Some(e) if prev.hardware_error != Some(e))
    }

    /// This reading with unknown fields filled in from `previous`, so that a
    /// failed read never erases the last known value.
    pub fn merged_over(&self, previous: Option<&StatusSnapshot>) -> StatusSnapshot {
        let Some(prev) = previous else {
            return *self;
        };
        StatusSnapshot {
            temperature: self.temperature.or(prev.temperature),
            voltage: self.voltage.or(prev.voltage),
            current: self.current.or(prev.current),
            hardware_error: self.hardware_error.or(prev.hardware_error),
        }
    }

    /// The non-zero error bitmask that should be reported as a new fault.
    pub fn new_fault(&self, previous: Option<&StatusSnapshot>) -> Option<u8> {
        let bits = self.hardware_error.filter(|&b| b != 0)?;
        match previous {
            Some(prev) if prev.hardware_error == Some(bits) => None,
            _ => Some(bits),
        }
    }

    pub fn to_message(&self, device_id: ServoId, joint: Option<&str>) -> ServoStatus {
        ServoStatus {
            device_id,
            joint: joint.map(str::to_string),
            temperature: self.temperature,
            voltage: self.voltage,
            current: self.current,
            hardware_error: self.hardware_error,
            alerts: self
                .hardware_error
                .map(HardwareAlert::decode)
                .unwrap_or_default(),
        }
    }
}

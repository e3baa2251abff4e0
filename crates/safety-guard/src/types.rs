use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Severity levels for safety faults
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Warning,
    Error,
    Critical,
    Emergency,
}

/// Arming state of the robot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArmState {
    Disarmed,
    Armed,
    Error,
}

impl std::fmt::Display for ArmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArmState::Disarmed => write!(f, "disarmed"),
            ArmState::Armed => write!(f, "armed"),
            ArmState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ArmState,
    pub to: ArmState,
}

/// Where a fault came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    Hardware,
    Communication,
    Software,
}

/// Fault report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyFault {
    pub timestamp: SystemTime,
    pub category: FaultCategory,
    pub severity: ViolationSeverity,
    pub message: String,
    pub context: HashMap<String, serde_json::Value>,
}

impl SafetyFault {
    pub fn new(category: FaultCategory, severity: ViolationSeverity, message: String) -> Self {
        Self {
            timestamp: SystemTime::now(),
            category,
            severity,
            message,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// A fault as recorded by the monitor
#[derive(Debug, Clone)]
pub struct ReportedFault {
    pub robot: String,
    pub path: Vec<String>,
    pub fault: SafetyFault,
}

/// Safety event for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub timestamp: SystemTime,
    pub event_type: SafetyEventType,
    pub message: String,
    pub severity: ViolationSeverity,
}

/// Types of safety events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SafetyEventType {
    ComponentRegistered,
    FaultReported,
    Armed,
    Disarmed,
    DisarmFailed,
    SystemRecovery,
}

impl std::fmt::Display for SafetyEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyEventType::ComponentRegistered => write!(f, "ComponentRegistered"),
            SafetyEventType::FaultReported => write!(f, "FaultReported"),
            SafetyEventType::Armed => write!(f, "Armed"),
            SafetyEventType::Disarmed => write!(f, "Disarmed"),
            SafetyEventType::DisarmFailed => write!(f, "DisarmFailed"),
            SafetyEventType::SystemRecovery => write!(f, "SystemRecovery"),
        }
    }
}

//! safety-guard: arming state and disarm coordination for robotics
//!
//! This crate provides the safety contract shared by hardware components:
//! - Registration of disarm hooks, replaced whenever a component's state changes
//! - Fault reporting with severity and structured context
//! - A broadcast stream of arm/disarm state transitions
//! - An in-process [`SafetyMonitor`] implementing the contract

mod types;
pub use types::{
    ArmState, FaultCategory, ReportedFault, SafetyEvent, SafetyEventType, SafetyFault,
    StateTransition, ViolationSeverity,
};

mod error;
pub use error::{Result, SafetyError};

mod monitor;
pub use monitor::{DisarmReport, SafetyMonitor};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Action taken by the safety system to make a component safe.
///
/// Hooks must not depend on the registering component still running: they are
/// invoked with whatever they captured at registration time.
#[async_trait]
pub trait DisarmHook: Send + Sync {
    async fn disarm(&self) -> Result<()>;
}

/// What a component hands to the safety system.
#[derive(Clone)]
pub struct Registration {
    pub robot: String,
    pub path: Vec<String>,
    pub hook: Arc<dyn DisarmHook>,
}

/// The safety system as seen by hardware components.
pub trait SafetyController: Send + Sync {
    /// Register (or replace) the disarm hook of `component`. Never blocks on I/O.
    fn register(&self, component: &str, registration: Registration) -> Result<()>;

    /// Report a fault originating at `path` on `robot`.
    fn report_error(&self, robot: &str, path: &[String], fault: SafetyFault);

    /// Subscribe to arm state transitions.
    fn subscribe(&self) -> broadcast::Receiver<StateTransition>;

    /// Current arm state, for catching up after missed transitions.
    fn arm_state(&self) -> ArmState;
}

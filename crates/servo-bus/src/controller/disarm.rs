use crate::config::DisarmAction;
use async_trait::async_trait;
use safety_guard::DisarmHook;
use servo_transport::{ServoId, ServoTransport, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DISARM_TIMEOUT: Duration = Duration::from_millis(250);

/// Everything needed to make the bus safe, captured at registration time so the
/// safety system can act even when the controller task is gone.
#[derive(Clone)]
pub struct DisarmSnapshot {
    pub transport: Arc<dyn ServoTransport>,
    pub device_ids: Vec<ServoId>,
    pub action: DisarmAction,
}

impl DisarmSnapshot {
    /// Disable torque on every captured servo with one bulk write. Never fails:
    /// transport errors and timeouts are logged and swallowed.
    pub async fn run(&self) {
        if self.action == DisarmAction::Hold || self.device_ids.is_empty() {
            return;
        }
        let values: Vec<(ServoId, Value)> = self
            .device_ids
            .iter()
            .map(|&id| (id, Value::Bool(false)))
            .collect();
        let write = self
            .transport
            .sync_write(control_table::TORQUE_ENABLE, &values);
        match tokio::time::timeout(DISARM_TIMEOUT, write).await {
            Ok(Ok(())) => info!(servos = values.len(), "torque disabled"),
            Ok(Err(e)) => warn!(error = %e, "torque disable failed during disarm"),
            Err(_) => warn!("torque disable timed out during disarm"),
        }
    }
}

#[async_trait]
impl DisarmHook for DisarmSnapshot {
    async fn disarm(&self) -> safety_guard::Result<()> {
        self.run().await;
        Ok(())
    }
}

//! Remote parameter access.
//!
//! Parameters are addressed as `"<device_id>:<name>"`. Every request is checked
//! against the control-table catalog before it reaches the bus.

use crate::config::{BridgeOptions, TorqueCheck};
use crate::controller::ControllerHandle;
use crate::error::BridgeError;
use control_table::{list_params, param_info, Category, ParamDescriptor, TORQUE_ENABLE};
use serde::Serialize;
use servo_transport::{ServoId, Value};
use tracing::{debug, warn};

type Result<T, E = BridgeError> = core::result::Result<T, E>;

/// Metadata of one remotely visible parameter. Carries no live value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamEntry {
    pub id: String,
    pub writable: bool,
    pub category: Category,
    pub requires_torque_off: bool,
    pub doc: &'static str,
}

/// Split `"<id>:<name>"`, with the id in `1..=253`.
pub fn parse_param_id(param_id: &str) -> Result<(ServoId, &str)> {
    let invalid = || BridgeError::InvalidParamId(param_id.to_string());
    let (id, name) = param_id.split_once(':').ok_or_else(invalid)?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return Err(invalid());
    }
    let raw: u8 = id.parse().map_err(|_| invalid())?;
    let id = ServoId::new(raw).ok_or_else(invalid)?;
    Ok((id, name))
}

#[derive(Clone)]
pub struct Bridge {
    controller: ControllerHandle,
    options: BridgeOptions,
}

impl Bridge {
    pub fn new(controller: ControllerHandle, options: BridgeOptions) -> Self {
        Self {
            controller,
            options,
        }
    }

    async fn descriptor(&self, param_id: &str) -> Result<(ServoId, ParamDescriptor)> {
        let (id, name) = parse_param_id(param_id)?;
        let table = self.controller.control_table().await?;
        let info =
            param_info(table, name).map_err(|_| BridgeError::UnknownParam(param_id.to_string()))?;
        Ok((id, info))
    }

    /// One entry per registered servo and catalog parameter.
    pub async fn list_remote(&self) -> Result<Vec<ParamEntry>> {
        let table = self.controller.control_table().await?;
        let ids = self.controller.list_devices().await?;
        let mut entries = Vec::new();
        for id in ids {
            for name in list_params(table) {
                let Ok(info) = param_info(table, name) else {
                    continue;
                };
                entries.push(ParamEntry {
                    id: format!("{id}:{name}"),
                    writable: info.writable,
                    category: info.category,
                    requires_torque_off: info.requires_torque_off,
                    doc: info.doc,
                });
            }
        }
        Ok(entries)
    }

    pub async fn get_remote(&self, param_id: &str) -> Result<Value> {
        let (id, info) = self.descriptor(param_id).await?;
        Ok(self.controller.read(id, info.name).await?)
    }

    pub async fn set_remote(&self, param_id: &str, value: Value) -> Result<()> {
        let (id, info) = self.descriptor(param_id).await?;
        if !info.writable {
            return Err(BridgeError::ReadOnly(param_id.to_string()));
        }
        if info.requires_torque_off {
            match self.controller.read(id, TORQUE_ENABLE).await {
                Ok(v) if v.as_bool() == Some(true) => {
                    return Err(BridgeError::TorqueMustBeDisabled {
                        id,
                        param: info.name.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => match self.options.torque_check {
                    TorqueCheck::AssumeDisabled => {
                        warn!(device_id = %id, error = %e, "torque state unknown, assuming disabled");
                    }
                    TorqueCheck::Reject => return Err(BridgeError::TorqueStateUnknown(id)),
                },
            }
        }
        debug!(device_id = %id, param = info.name, %value, "remote parameter write");
        self.controller.write(id, info.name, value, true).await?;
        Ok(())
    }
}

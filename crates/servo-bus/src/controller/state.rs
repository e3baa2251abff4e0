use super::disarm::DisarmSnapshot;
use super::status::StatusSnapshot;
use super::{Request, ServoRegistration};
use crate::config::ControllerOptions;
use crate::error::{ControllerError, Result};
use crate::mapping::{deadband_degrees, raw_degrees_to_angle, DEFAULT_RESOLUTION};
use crate::messages::{JointState, Payload};
use crate::metrics::MetricsHub;
use crate::pubsub::EventBus;
use control_table::{status_registers, HardwareAlert, PRESENT_POSITION, TORQUE_ENABLE};
use safety_guard::{
    ArmState, FaultCategory, Registration, SafetyController, SafetyFault, StateTransition,
    ViolationSeverity,
};
use servo_transport::{ServoId, ServoTransport, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub(crate) struct RegistryEntry {
    pub joint: String,
    pub center_angle: f64,
    pub deadband_raw: u32,
    pub reverse: bool,
    /// Last published position in degrees
    pub last_position: Option<f64>,
}

/// Everything the controller task owns. Polling and transition handling live
/// here so they can be driven directly.
pub(crate) struct ControllerState {
    pub options: ControllerOptions,
    pub transport: Arc<dyn ServoTransport>,
    pub safety: Arc<dyn SafetyController>,
    pub events: Arc<dyn EventBus>,
    pub metrics: MetricsHub,
    pub registry: BTreeMap<ServoId, RegistryEntry>,
    pub last_status: HashMap<ServoId, StatusSnapshot>,
}

impl ControllerState {
    pub fn new(
        options: ControllerOptions,
        transport: Arc<dyn ServoTransport>,
        safety: Arc<dyn SafetyController>,
        events: Arc<dyn EventBus>,
        metrics: MetricsHub,
    ) -> Self {
        Self {
            options,
            transport,
            safety,
            events,
            metrics,
            registry: BTreeMap::new(),
            last_status: HashMap::new(),
        }
    }

    fn device_ids(&self) -> Vec<ServoId> {
        self.registry.keys().copied().collect()
    }

    /// Hand the safety system a fresh disarm snapshot of the current registry.
    pub fn publish_safety_snapshot(&self) -> Result<()> {
        let hook = DisarmSnapshot {
            transport: self.transport.clone(),
            device_ids: self.device_ids(),
            action: self.options.disarm_action,
        };
        self.safety.register(
            &self.options.name,
            Registration {
                robot: self.options.robot.clone(),
                path: vec![self.options.name.clone()],
                hook: Arc::new(hook),
            },
        )?;
        Ok(())
    }

    pub fn register(&mut self, reg: ServoRegistration) -> Result<()> {
        let entry = RegistryEntry {
            joint: reg.joint,
            center_angle: reg.center_angle,
            deadband_raw: reg.position_deadband,
            reverse: reg.reverse,
            last_position: None,
        };
        let previous = self.registry.insert(reg.device_id, entry);
        if let Err(e) = self.publish_safety_snapshot() {
            match previous {
                Some(p) => self.registry.insert(reg.device_id, p),
                None => self.registry.remove(&reg.device_id),
            };
            return Err(e);
        }
        self.metrics
            .bus
            .registered_servos
            .set(self.registry.len() as i64);
        info!(device_id = %reg.device_id, servos = self.registry.len(), "servo registered");
        Ok(())
    }

    pub async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Register { registration, reply } => {
                let _ = reply.send(self.register(registration));
            }
            Request::Read { id, param, reply } => {
                let r = self.transport.read(id, &param).await;
                let _ = reply.send(r.map_err(ControllerError::from));
            }
            Request::Write {
                id,
                param,
                value,
                await_response,
                reply,
            } => {
                let r = self
                    .transport
                    .write(id, &param, value, await_response)
                    .await
                    .map_err(ControllerError::from);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(r);
                    }
                    None => {
                        if let Err(e) = r {
                            warn!(device_id = %id, param = %param, error = %e, "write failed");
                        }
                    }
                }
            }
            Request::WriteRaw {
                id,
                param,
                raw,
                await_response,
                reply,
            } => {
                let r = self
                    .transport
                    .write_raw(id, &param, raw, await_response)
                    .await
                    .map_err(ControllerError::from);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(r);
                    }
                    None => {
                        if let Err(e) = r {
                            warn!(device_id = %id, param = %param, raw, error = %e, "raw write failed");
                        }
                    }
                }
            }
            Request::ListDevices { reply } => {
                let _ = reply.send(self.device_ids());
            }
            Request::ControlTable { reply } => {
                let _ = reply.send(self.options.control_table);
            }
            Request::Ping { id, reply } => {
                let r = self.transport.ping(id).await;
                let _ = reply.send(r.map_err(ControllerError::from));
            }
            // handled by the run loop
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// One bulk position read; publishes joint state for servos that moved
    /// past their deadband.
    pub async fn poll_positions(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        self.metrics.bus.position_polls.inc();
        let ids = self.device_ids();
        let results = match self.transport.fast_sync_read(&ids, PRESENT_POSITION).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "position poll failed");
                self.metrics.bus.read_failures.inc();
                return;
            }
        };
        for (id, result) in results {
            let degrees = match result.map(|v| v.as_f64()) {
                Ok(Some(d)) => d,
                Ok(None) => {
                    debug!(device_id = %id, "non-numeric position");
                    continue;
                }
                Err(e) => {
                    debug!(device_id = %id, error = %e, "position read failed");
                    self.metrics.bus.read_failures.inc();
                    continue;
                }
            };
            let Some(entry) = self.registry.get_mut(&id) else {
                continue;
            };
            let threshold = deadband_degrees(entry.deadband_raw, DEFAULT_RESOLUTION);
            let moved = match entry.last_position {
                None => true,
                Some(last) => (degrees - last).abs() >= threshold,
            };
            if !moved {
                continue;
            }
            entry.last_position = Some(degrees);
            let angle = raw_degrees_to_angle(degrees, entry.center_angle, entry.reverse);
            self.events.publish(
                vec![
                    "sensor".to_string(),
                    self.options.name.clone(),
                    entry.joint.clone(),
                ],
                Payload::JointState(JointState::position(&entry.joint, angle)),
            );
            self.metrics.bus.joint_state_events.inc();
        }
    }

    async fn read_field(&self, ids: &[ServoId], param: &str) -> HashMap<ServoId, Value> {
        match self.transport.fast_sync_read(ids, param).await {
            Ok(results) => results
                .into_iter()
                .filter_map(|(id, r)| match r {
                    Ok(v) => Some((id, v)),
                    Err(e) => {
                        debug!(device_id = %id, param, error = %e, "status read failed");
                        self.metrics.bus.read_failures.inc();
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!(param, error = %e, "status read failed");
                self.metrics.bus.read_failures.inc();
                HashMap::new()
            }
        }
    }

    /// Read temperature, voltage, current and error flags; publish changes and
    /// report new hardware faults.
    pub async fn poll_status(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        self.metrics.bus.status_polls.inc();
        let ids = self.device_ids();
        let regs = status_registers(self.options.control_table);

        let temperature = self.read_field(&ids, regs.temperature).await;
        let voltage = self.read_field(&ids, regs.voltage).await;
        let current = match regs.current {
            Some(reg) => self.read_field(&ids, reg).await,
            None => HashMap::new(),
        };
        let errors = self.read_field(&ids, regs.hardware_error).await;

        for id in ids {
            let snapshot = StatusSnapshot {
                temperature: temperature.get(&id).and_then(Value::as_f64),
                voltage: voltage.get(&id).and_then(Value::as_f64),
                current: current.get(&id).and_then(Value::as_f64),
                hardware_error: errors
                    .get(&id)
                    .and_then(Value::as_i64)
                    .and_then(|v| u8::try_from(v).ok()),
            };
            if snapshot.is_unknown() {
                continue;
            }
            let previous = self.last_status.get(&id);
            if !snapshot.changed_from(previous) {
                continue;
            }
            let fault = snapshot.new_fault(previous);
            let stored = snapshot.merged_over(previous);
            let joint = self.registry.get(&id).map(|e| e.joint.clone());

            self.events.publish(
                vec![
                    "sensor".to_string(),
                    self.options.name.clone(),
                    "status".to_string(),
                ],
                Payload::ServoStatus(snapshot.to_message(id, joint.as_deref())),
            );
            self.metrics.bus.status_events.inc();
            if let Some(bits) = fault {
                self.report_fault(id, joint.as_deref(), bits);
            }
            self.last_status.insert(id, stored);
        }
    }

    fn report_fault(&self, id: ServoId, joint: Option<&str>, bits: u8) {
        let alerts = HardwareAlert::decode(bits);
        let severity = if alerts.is_empty() {
            ViolationSeverity::Error
        } else {
            ViolationSeverity::Critical
        };
        let names: Vec<&str> = alerts.iter().map(|a| a.as_str()).collect();
        let key = joint
            .map(str::to_string)
            .unwrap_or_else(|| format!("servo_{id}"));
        warn!(device_id = %id, bitmask = bits, alerts = ?names, "hardware error");

        let fault = SafetyFault::new(
            FaultCategory::Hardware,
            severity,
            format!("servo {id} hardware error 0x{bits:02X}"),
        )
        .with_context("device_id", id.raw())
        .with_context("bitmask", bits)
        .with_context("alerts", names);
        self.safety.report_error(&self.options.robot, &[key], fault);
        self.metrics.bus.hardware_faults.inc();
    }

    pub async fn handle_transition(&mut self, transition: StateTransition) {
        if transition.to != ArmState::Armed || self.registry.is_empty() {
            return;
        }
        let values: Vec<(ServoId, Value)> = self
            .registry
            .keys()
            .map(|&id| (id, Value::Bool(true)))
            .collect();
        match self.transport.sync_write(TORQUE_ENABLE, &values).await {
            Ok(()) => {
                info!(servos = values.len(), "torque enabled on arm");
                self.metrics.bus.torque_writes.inc();
            }
            Err(e) => warn!(error = %e, "torque enable failed on arm"),
        }
    }

    /// Catch up after missed transitions by acting on the current arm state.
    pub async fn resync_arm_state(&mut self) {
        let current = self.safety.arm_state();
        self.handle_transition(StateTransition {
            from: current,
            to: current,
        })
        .await;
    }

    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut transitions: broadcast::Receiver<StateTransition>,
    ) {
        let mut position_tick = time::interval(self.options.poll_interval());
        position_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status_tick = self.options.status_interval().map(|d| {
            let mut i = time::interval(d);
            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
            i
        });
        let mut transitions_open = true;
        info!(
            controller = %self.options.name,
            port = %self.options.port,
            table = %self.options.control_table,
            "servo controller started"
        );

        loop {
            tokio::select! {
                req = requests.recv() => match req {
                    Some(Request::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(req) => self.handle_request(req).await,
                    None => break,
                },
                _ = position_tick.tick() => self.poll_positions().await,
                _ = next_tick(&mut status_tick) => self.poll_status().await,
                t = transitions.recv(), if transitions_open => match t {
                    Ok(t) => self.handle_transition(t).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "missed arm state transitions");
                        self.resync_arm_state().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => transitions_open = false,
                },
            }
        }
        info!(controller = %self.options.name, "servo controller stopped");
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

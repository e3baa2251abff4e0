//! Per-joint command pipeline.
//!
//! An actuator owns one servo. It clamps incoming position commands to the
//! joint limits, forwards the raw goal to the controller without waiting for
//! the bus, and announces the motion with a [`BeginMotion`] event.

use crate::config::ActuatorOptions;
use crate::controller::{ControllerHandle, ServoRegistration};
use crate::error::ActuatorError;
use crate::mapping::{angle_to_raw, DEFAULT_RESOLUTION};
use crate::messages::{BeginMotion, CommandType, Envelope, Payload, PositionCommand};
use crate::pubsub::EventBus;
use crate::topology::{JointKind, JointSource};
use async_trait::async_trait;
use control_table::{GOAL_POSITION, TORQUE_ENABLE};
use safety_guard::{DisarmHook, Registration, SafetyController};
use servo_transport::{ServoId, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type Result<T, E = ActuatorError> = core::result::Result<T, E>;

/// Limits resolved from the joint configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedJoint {
    pub lower: f64,
    pub upper: f64,
    pub velocity: f64,
}

impl ResolvedJoint {
    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    pub fn range(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Look up `joint` and check it has everything position control needs.
pub fn resolve_joint(joints: &dyn JointSource, joint: &str) -> Result<ResolvedJoint> {
    let spec = joints
        .joint(joint)
        .ok_or_else(|| ActuatorError::JointNotFound(joint.to_string()))?;
    if spec.kind == JointKind::Continuous {
        return Err(ActuatorError::UnsupportedJointType {
            joint: joint.to_string(),
            kind: spec.kind,
        });
    }
    let limits = spec
        .limits
        .ok_or_else(|| ActuatorError::MissingLimits(joint.to_string()))?;
    let lower = limits
        .lower
        .ok_or_else(|| ActuatorError::MissingLowerLimit(joint.to_string()))?;
    let upper = limits
        .upper
        .ok_or_else(|| ActuatorError::MissingUpperLimit(joint.to_string()))?;
    let velocity = limits
        .velocity
        .filter(|v| *v > 0.0)
        .ok_or_else(|| ActuatorError::MissingVelocityLimit(joint.to_string()))?;
    // also rejects NaN limits
    if !(lower <= upper) {
        return Err(ActuatorError::InvalidLimits {
            joint: joint.to_string(),
            lower,
            upper,
        });
    }
    Ok(ResolvedJoint {
        lower,
        upper,
        velocity,
    })
}

/// How a command reached the actuator; only `Call` gets an answer.
pub(crate) enum Delivery {
    Broadcast,
    Cast,
    Call(oneshot::Sender<Result<BeginMotion>>),
}

enum ActuatorRequest {
    Command {
        command: PositionCommand,
        delivery: Delivery,
    },
    Stop(oneshot::Sender<()>),
}

/// Torque is managed in bulk by the controller.
struct NoopDisarm;

#[async_trait]
impl DisarmHook for NoopDisarm {
    async fn disarm(&self) -> safety_guard::Result<()> {
        Ok(())
    }
}

struct Actuator {
    controller: ControllerHandle,
    events: Arc<dyn EventBus>,
    device_id: ServoId,
    joint: String,
    reverse: bool,
    limits: ResolvedJoint,
    center: f64,
    current: f64,
}

impl Actuator {
    /// Run the startup sequence and spawn the command loop.
    ///
    /// Each step must succeed; any failure stops the actuator before it
    /// accepts a single command.
    async fn start(
        options: ActuatorOptions,
        joints: &dyn JointSource,
        controller: ControllerHandle,
        safety: Arc<dyn SafetyController>,
        events: Arc<dyn EventBus>,
    ) -> Result<ActuatorHandle> {
        let id = options.device_id;
        let limits = resolve_joint(joints, &options.joint)?;
        let center = limits.center();
        debug!(joint = %options.joint, center, range = limits.range(), "joint resolved");

        controller
            .write(id, TORQUE_ENABLE, Value::Bool(false), true)
            .await?;
        let raw = angle_to_raw(center, center, options.reverse, DEFAULT_RESOLUTION);
        controller.write_raw(id, GOAL_POSITION, raw, true).await?;
        controller
            .register(ServoRegistration {
                device_id: id,
                joint: options.joint.clone(),
                center_angle: center,
                position_deadband: options.position_deadband,
                reverse: options.reverse,
            })
            .await?;
        safety.register(
            &format!("{}:{}", controller.name(), options.joint),
            Registration {
                robot: controller.robot().to_string(),
                path: vec![controller.name().to_string(), options.joint.clone()],
                hook: Arc::new(NoopDisarm),
            },
        )?;

        let commands = events.subscribe(vec!["command".to_string(), options.joint.clone()]);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ActuatorHandle {
            tx,
            joint: Arc::from(options.joint.as_str()),
            device_id: id,
        };
        let actuator = Actuator {
            controller,
            events,
            device_id: id,
            joint: options.joint,
            reverse: options.reverse,
            limits,
            center,
            current: center,
        };
        info!(joint = %actuator.joint, device_id = %id, "actuator ready");
        tokio::spawn(actuator.run(commands, rx));
        Ok(handle)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Envelope>,
        mut requests: mpsc::UnboundedReceiver<ActuatorRequest>,
    ) {
        let mut commands_open = true;
        let mut requests_open = true;
        while commands_open || requests_open {
            tokio::select! {
                env = commands.recv(), if commands_open => match env {
                    Some(Envelope { payload: Payload::PositionCommand(cmd), .. }) => {
                        self.handle(cmd, Delivery::Broadcast);
                    }
                    Some(other) => debug!(joint = %self.joint, path = ?other.path, "ignoring non-command payload"),
                    None => commands_open = false,
                },
                req = requests.recv(), if requests_open => match req {
                    Some(ActuatorRequest::Command { command, delivery }) => self.handle(command, delivery),
                    Some(ActuatorRequest::Stop(reply)) => {
                        let _ = reply.send(());
                        break;
                    }
                    None => requests_open = false,
                },
            }
        }
        info!(joint = %self.joint, "actuator stopped");
    }

    fn handle(&mut self, command: PositionCommand, delivery: Delivery) {
        let result = self.begin_motion(&command);
        match delivery {
            Delivery::Call(reply) => {
                let _ = reply.send(result);
            }
            Delivery::Broadcast | Delivery::Cast => {
                if let Err(e) = result {
                    warn!(joint = %self.joint, error = %e, "position command dropped");
                }
            }
        }
    }

    fn begin_motion(&mut self, command: &PositionCommand) -> Result<BeginMotion> {
        if command.position.is_nan() {
            return Err(ActuatorError::InvalidCommand {
                joint: self.joint.clone(),
                position: command.position,
            });
        }
        let target = command.position.clamp(self.limits.lower, self.limits.upper);
        let raw = angle_to_raw(target, self.center, self.reverse, DEFAULT_RESOLUTION);
        self.controller
            .write_raw_nowait(self.device_id, GOAL_POSITION, raw)?;

        let now = OffsetDateTime::now_utc();
        let travel = (self.current - target).abs() / self.limits.velocity;
        let expected_arrival = std::time::Duration::try_from_secs_f64(travel)
            .ok()
            .and_then(|d| time::Duration::try_from(d).ok())
            .and_then(|d| now.checked_add(d))
            .unwrap_or(now);

        let motion = BeginMotion {
            initial_position: self.current,
            target_position: target,
            expected_arrival,
            command_id: command.command_id,
            command_type: CommandType::Position,
        };
        self.events.publish(
            vec!["actuator".to_string(), self.joint.clone()],
            Payload::BeginMotion(motion.clone()),
        );
        debug!(joint = %self.joint, target, raw, travel, "motion begun");
        self.current = target;
        Ok(motion)
    }
}

/// Start the actuator described by `options`.
pub async fn start_actuator(
    options: ActuatorOptions,
    joints: &dyn JointSource,
    controller: ControllerHandle,
    safety: Arc<dyn SafetyController>,
    events: Arc<dyn EventBus>,
) -> Result<ActuatorHandle> {
    let joint = options.joint.clone();
    Actuator::start(options, joints, controller, safety, events)
        .await
        .inspect_err(|e| error!(joint = %joint, error = %e, "actuator failed to start"))
}

/// Direct delivery into a running actuator.
#[derive(Clone)]
pub struct ActuatorHandle {
    tx: mpsc::UnboundedSender<ActuatorRequest>,
    joint: Arc<str>,
    device_id: ServoId,
}

impl ActuatorHandle {
    pub fn joint(&self) -> &str {
        &self.joint
    }

    pub fn device_id(&self) -> ServoId {
        self.device_id
    }

    fn send(&self, command: PositionCommand, delivery: Delivery) -> Result<()> {
        self.tx
            .send(ActuatorRequest::Command { command, delivery })
            .map_err(|_| ActuatorError::Stopped(self.joint.to_string()))
    }

    /// Fire and forget.
    pub fn cast(&self, command: PositionCommand) -> Result<()> {
        self.send(command, Delivery::Cast)
    }

    /// Wait until the command has been accepted and forwarded to the bus.
    /// Does not wait for the servo to arrive.
    pub async fn call(&self, command: PositionCommand) -> Result<BeginMotion> {
        let (reply, rx) = oneshot::channel();
        self.send(command, Delivery::Call(reply))?;
        rx.await
            .map_err(|_| ActuatorError::Stopped(self.joint.to_string()))?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ActuatorRequest::Stop(reply))
            .map_err(|_| ActuatorError::Stopped(self.joint.to_string()))?;
        rx.await
            .map_err(|_| ActuatorError::Stopped(self.joint.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerOptions;
    use crate::controller::Controller;
    use crate::pubsub::{path, LocalEventBus};
    use crate::topology::{parse_description, RobotDescription};
    use safety_guard::SafetyMonitor;
    use servo_transport::{MockBus, WriteRecord};
    use std::time::Duration;
    use uuid::Uuid;

    const JOINTS: &str = r#"
joints:
  - name: shoulder
    type: revolute
    limits: { lower: -1.0, upper: 1.0, velocity: 1.0, effort: 2.0 }
  - name: flipped
    type: revolute
    limits: { lower: 0.0, upper: 2.0, velocity: 0.5 }
  - name: spinner
    type: continuous
  - name: bare
    type: revolute
  - name: no_lower
    type: revolute
    limits: { upper: 1.0, velocity: 1.0 }
  - name: no_upper
    type: revolute
    limits: { lower: -1.0, velocity: 1.0 }
  - name: no_velocity
    type: revolute
    limits: { lower: -1.0, upper: 1.0 }
  - name: inverted
    type: revolute
    limits: { lower: 1.0, upper: -1.0, velocity: 1.0 }
"#;

    struct Rig {
        bus: Arc<MockBus>,
        safety: Arc<SafetyMonitor>,
        events: Arc<LocalEventBus>,
        controller: ControllerHandle,
        joints: RobotDescription,
    }

    fn id(raw: u8) -> ServoId {
        ServoId::new(raw).unwrap()
    }

    fn rig() -> Rig {
        let bus = Arc::new(MockBus::new("mock0"));
        bus.add_servo(id(1));
        bus.add_servo(id(2));
        let safety = Arc::new(SafetyMonitor::new());
        let events = Arc::new(LocalEventBus::recording());
        let controller = Controller::spawn_with_transport(
            ControllerOptions {
                robot: "arm".into(),
                name: "dxl".into(),
                status_poll_interval_ms: 0,
                ..ControllerOptions::default()
            },
            bus.clone(),
            safety.clone(),
            events.clone(),
        )
        .unwrap();
        Rig {
            bus,
            safety,
            events,
            controller,
            joints: parse_description(JOINTS).unwrap(),
        }
    }

    async fn start(r: &Rig, options: ActuatorOptions) -> Result<ActuatorHandle> {
        start_actuator(
            options,
            &r.joints,
            r.controller.clone(),
            r.safety.clone(),
            r.events.clone(),
        )
        .await
    }

    fn raw_goals(bus: &MockBus) -> Vec<i64> {
        bus.writes()
            .into_iter()
            .filter_map(|w| match w {
                WriteRecord::Raw { param, raw, .. } if param == "goal_position" => Some(raw),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn resolve_joint_errors() {
        let joints = parse_description(JOINTS).unwrap();
        let err = |name: &str| resolve_joint(&joints, name).unwrap_err();
        assert_eq!(err("elbow"), ActuatorError::JointNotFound("elbow".into()));
        assert!(matches!(
            err("spinner"),
            ActuatorError::UnsupportedJointType {
                kind: JointKind::Continuous,
                ..
            }
        ));
        assert_eq!(err("bare"), ActuatorError::MissingLimits("bare".into()));
        assert_eq!(err("no_lower"), ActuatorError::MissingLowerLimit("no_lower".into()));
        assert_eq!(err("no_upper"), ActuatorError::MissingUpperLimit("no_upper".into()));
        assert_eq!(
            err("no_velocity"),
            ActuatorError::MissingVelocityLimit("no_velocity".into())
        );
        assert!(matches!(err("inverted"), ActuatorError::InvalidLimits { .. }));

        let ok = resolve_joint(&joints, "flipped").unwrap();
        assert_eq!(ok.center(), 1.0);
        assert_eq!(ok.range(), 2.0);
    }

    #[tokio::test]
    async fn startup_sequence() {
        let r = rig();
        let handle = start(&r, ActuatorOptions::new(id(1), "shoulder"))
            .await
            .unwrap();
        assert_eq!(handle.joint(), "shoulder");
        assert_eq!(handle.device_id(), id(1));

        assert_eq!(
            r.bus.writes(),
            vec![
                WriteRecord::Write {
                    id: id(1),
                    param: "torque_enable".into(),
                    value: Value::Bool(false),
                },
                WriteRecord::Raw {
                    id: id(1),
                    param: "goal_position".into(),
                    raw: 2048,
                },
            ]
        );
        assert_eq!(r.controller.list_devices().await.unwrap(), vec![id(1)]);
        let reg = r.safety.registration("dxl:shoulder").unwrap();
        assert_eq!(reg.robot, "arm");
        assert_eq!(reg.path, vec!["dxl".to_string(), "shoulder".to_string()]);
        assert!(reg.hook.disarm().await.is_ok());
    }

    #[tokio::test]
    async fn failed_startup_registers_nothing() {
        let r = rig();
        let err = start(&r, ActuatorOptions::new(id(1), "spinner"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ActuatorError::UnsupportedJointType { .. }));
        assert!(r.bus.writes().is_empty());
        assert!(r.controller.list_devices().await.unwrap().is_empty());

        // servo 7 is not on the bus, so the torque write fails
        let err = start(&r, ActuatorOptions::new(id(7), "shoulder"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ActuatorError::Controller(_)));
        assert!(r.controller.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn call_clamps_and_reports_motion() {
        let r = rig();
        let handle = start(&r, ActuatorOptions::new(id(1), "shoulder"))
            .await
            .unwrap();

        let before = OffsetDateTime::now_utc();
        let cmd_id = Uuid::new_v4();
        let motion = handle
            .call(PositionCommand::with_id(5.0, cmd_id))
            .await
            .unwrap();
        assert_eq!(motion.initial_position, 0.0);
        assert_eq!(motion.target_position, 1.0);
        assert_eq!(motion.command_id, Some(cmd_id));
        assert_eq!(motion.command_type, CommandType::Position);
        let eta = motion.expected_arrival - before;
        assert!(eta >= time::Duration::milliseconds(990));
        assert!(eta <= time::Duration::seconds(2));

        let motion = handle.call(PositionCommand::new(-5.0)).await.unwrap();
        assert_eq!(motion.initial_position, 1.0);
        assert_eq!(motion.target_position, -1.0);

        // the nowait writes are ahead of this request in the controller queue
        r.controller.list_devices().await.unwrap();
        assert_eq!(raw_goals(&r.bus), vec![2048, 2700, 1396]);

        let published = r.events.history_under(&["actuator", "shoulder"]);
        assert_eq!(published.len(), 2);
        assert!(matches!(
            &published[0].payload,
            Payload::BeginMotion(m) if m.target_position == 1.0
        ));
    }

    #[tokio::test]
    async fn reverse_mirrors_goal() {
        let r = rig();
        let mut options = ActuatorOptions::new(id(2), "flipped");
        options.reverse = true;
        let handle = start(&r, options).await.unwrap();
        handle.call(PositionCommand::new(2.0)).await.unwrap();
        r.controller.list_devices().await.unwrap();
        // centre 1.0; +1 rad reversed is 2048 - 652
        assert_eq!(raw_goals(&r.bus), vec![2048, 1396]);
    }

    #[tokio::test]
    async fn cast_and_broadcast_share_the_pipeline() {
        let r = rig();
        let handle = start(&r, ActuatorOptions::new(id(1), "shoulder"))
            .await
            .unwrap();
        let mut motions = r.events.subscribe(path(&["actuator", "shoulder"]));

        handle.cast(PositionCommand::new(0.5)).unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), motions.recv())
            .await
            .unwrap()
            .unwrap();

        r.events.publish(
            path(&["command", "shoulder"]),
            Payload::PositionCommand(PositionCommand::new(-0.25)),
        );
        let second = tokio::time::timeout(Duration::from_secs(1), motions.recv())
            .await
            .unwrap()
            .unwrap();

        match (first.payload, second.payload) {
            (Payload::BeginMotion(a), Payload::BeginMotion(b)) => {
                assert_eq!(a.target_position, 0.5);
                assert_eq!(b.initial_position, 0.5);
                assert_eq!(b.target_position, -0.25);
            }
            other => panic!("unexpected payloads: {other:?}"),
        }
    }

    #[tokio::test]
    async fn nan_command_is_rejected() {
        let r = rig();
        let handle = start(&r, ActuatorOptions::new(id(1), "shoulder"))
            .await
            .unwrap();
        assert!(matches!(
            handle.call(PositionCommand::new(f64::NAN)).await,
            Err(ActuatorError::InvalidCommand { .. })
        ));
    }

    #[tokio::test]
    async fn stopped_actuator_refuses_commands() {
        let r = rig();
        let handle = start(&r, ActuatorOptions::new(id(1), "shoulder"))
            .await
            .unwrap();
        handle.stop().await.unwrap();
        assert_eq!(
            handle.call(PositionCommand::new(0.1)).await.err(),
            Some(ActuatorError::Stopped("shoulder".into()))
        );
    }
}

use safety_guard::{ArmState, SafetyController, SafetyMonitor};
use servo_bus::{
    parse_description, path, start_actuator, Bridge, BridgeError, Controller, EventBus,
    LocalEventBus, Payload, PositionCommand,
};
use servo_transport::{Connect, MockBus, ServoId, Value};
use std::sync::Arc;
use std::time::Duration;

const ROBOT: &str = r#"
controller:
  robot: arm
  name: dxl
  port: "mock:1,2"
  poll_interval_ms: 10
  status_poll_interval_ms: 20
bridge:
  torque_check: reject
joints:
  - name: shoulder
    type: revolute
    limits: { lower: -1.0, upper: 1.0, velocity: 1.0, effort: 2.0 }
  - name: elbow
    type: revolute
    limits: { lower: -1.5, upper: 1.5, velocity: 2.0 }
servos:
  - device_id: 1
    joint: shoulder
  - device_id: 2
    joint: elbow
    reverse: true
"#;

fn id(raw: u8) -> ServoId {
    ServoId::new(raw).unwrap()
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn arm_command_feedback_disarm() {
    let desc = parse_description(ROBOT).unwrap();
    let bus = Arc::new(MockBus::open(&desc.controller.port, desc.controller.baud_rate).unwrap());
    let safety = Arc::new(SafetyMonitor::new());
    let events = Arc::new(LocalEventBus::recording());

    let controller = Controller::spawn_with_transport(
        desc.controller.clone(),
        bus.clone(),
        safety.clone(),
        events.clone(),
    )
    .unwrap();
    let mut actuators = Vec::new();
    for servo in desc.servos.clone() {
        let handle = start_actuator(
            servo,
            &desc,
            controller.clone(),
            safety.clone(),
            events.clone(),
        )
        .await
        .unwrap();
        actuators.push(handle);
    }
    assert_eq!(controller.list_devices().await.unwrap(), vec![id(1), id(2)]);
    assert_eq!(
        safety.registered(),
        vec!["dxl", "dxl:elbow", "dxl:shoulder"]
    );

    safety.arm().unwrap();
    eventually("torque on", || {
        bus.get(id(1), "torque_enable") == Some(Value::Bool(true))
            && bus.get(id(2), "torque_enable") == Some(Value::Bool(true))
    })
    .await;

    let mut shoulder = events.subscribe(path(&["sensor", "dxl", "shoulder"]));
    events.publish(
        path(&["command", "shoulder"]),
        Payload::PositionCommand(PositionCommand::new(5.0)),
    );
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(env) = shoulder.recv().await {
            if let Payload::JointState(js) = env.payload {
                if (js.positions[0] - 1.0).abs() < 2e-3 {
                    return js;
                }
            }
        }
        panic!("sensor stream closed");
    })
    .await
    .unwrap();
    assert_eq!(reached.names, vec!["shoulder"]);
    assert_eq!(bus.get(id(1), "goal_position"), Some(Value::Int(2700)));

    // elbow is reversed: +0.5 rad goes below centre
    actuators[1].call(PositionCommand::new(0.5)).await.unwrap();
    controller.list_devices().await.unwrap();
    assert_eq!(bus.get(id(2), "goal_position"), Some(Value::Int(1722)));

    let bridge = Bridge::new(controller.clone(), desc.bridge);
    assert!(matches!(
        bridge.set_remote("1:velocity_limit", Value::Int(10)).await,
        Err(BridgeError::TorqueMustBeDisabled { .. })
    ));

    let report = safety.disarm().await;
    assert!(report.is_clean());
    assert_eq!(report.attempted, 3);
    assert_eq!(bus.get(id(1), "torque_enable"), Some(Value::Bool(false)));
    assert_eq!(bus.get(id(2), "torque_enable"), Some(Value::Bool(false)));
    bridge
        .set_remote("1:velocity_limit", Value::Int(10))
        .await
        .unwrap();
    assert_eq!(bus.get(id(1), "velocity_limit"), Some(Value::Int(10)));
}

#[tokio::test]
async fn hardware_fault_moves_armed_robot_to_error() {
    let desc = parse_description(ROBOT).unwrap();
    let bus = Arc::new(MockBus::open("mock:1", 1_000_000).unwrap());
    let safety = Arc::new(SafetyMonitor::new());
    let events = Arc::new(LocalEventBus::recording());
    let controller = Controller::spawn_with_transport(
        desc.controller.clone(),
        bus.clone(),
        safety.clone(),
        events.clone(),
    )
    .unwrap();
    start_actuator(
        desc.servos[0].clone(),
        &desc,
        controller.clone(),
        safety.clone(),
        events.clone(),
    )
    .await
    .unwrap();
    safety.arm().unwrap();

    bus.set(id(1), "hardware_error_status", Value::Int(0b0010_0100));
    eventually("fault report", || !safety.faults().is_empty()).await;
    assert_eq!(safety.arm_state(), ArmState::Error);

    let fault = &safety.faults()[0];
    assert_eq!(fault.path, vec!["shoulder".to_string()]);
    assert_eq!(
        fault.fault.context["alerts"],
        serde_json::json!(["overheating", "overload"])
    );

    // the same bitmask on later polls is not reported again
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(safety.faults().len(), 1);
    assert!(controller
        .metrics()
        .encode_text()
        .contains("sr_servo_hardware_faults 1"));
}

#[tokio::test]
async fn controller_without_servos_disarms_cleanly() {
    let safety = Arc::new(SafetyMonitor::new());
    let desc = parse_description(ROBOT).unwrap();
    let _controller = Controller::spawn::<MockBus>(
        desc.controller,
        safety.clone(),
        Arc::new(LocalEventBus::new()),
    )
    .unwrap();
    let mut transitions = safety.subscribe();
    safety.arm().unwrap();
    assert_eq!(transitions.recv().await.unwrap().to, ArmState::Armed);
    let report = safety.disarm().await;
    assert!(report.is_clean());
    assert_eq!(report.attempted, 1);
}

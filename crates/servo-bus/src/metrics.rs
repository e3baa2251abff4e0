use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct BusMetrics {
    pub position_polls: IntCounter,
    pub status_polls: IntCounter,
    pub read_failures: IntCounter,
    pub joint_state_events: IntCounter,
    pub status_events: IntCounter,
    pub hardware_faults: IntCounter,
    pub torque_writes: IntCounter,
    pub registered_servos: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub bus: BusMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let registered_servos = IntGauge::new("sr_servo_registered", "Servos registered on the bus")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let bus = BusMetrics {
            position_polls: counter("sr_servo_position_polls", "Position poll ticks run")?,
            status_polls: counter("sr_servo_status_polls", "Status poll ticks run")?,
            read_failures: counter("sr_servo_read_failures", "Failed per-servo reads")?,
            joint_state_events: counter("sr_servo_joint_states", "Joint state events published")?,
            status_events: counter("sr_servo_status_events", "Servo status events published")?,
            hardware_faults: counter("sr_servo_hardware_faults", "Hardware faults reported")?,
            torque_writes: counter("sr_servo_torque_writes", "Bulk torque writes issued")?,
            registered_servos,
        };
        let collectors: [Box<dyn prometheus::core::Collector>; 8] = [
            Box::new(bus.position_polls.clone()),
            Box::new(bus.status_polls.clone()),
            Box::new(bus.read_failures.clone()),
            Box::new(bus.joint_state_events.clone()),
            Box::new(bus.status_events.clone()),
            Box::new(bus.hardware_faults.clone()),
            Box::new(bus.torque_writes.clone()),
            Box::new(bus.registered_servos.clone()),
        ];
        for c in collectors {
            let _ = registry.register(c);
        }
        Ok(Self { registry, bus })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

use crate::{Connect, PingInfo, Result, ServoId, ServoTransport, TransportError, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Encoder units per revolution used to mirror goal writes into positions.
const MOCK_RESOLUTION: f64 = 4096.0;

/// A write observed by the mock, in issue order.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteRecord {
    Write {
        id: ServoId,
        param: String,
        value: Value,
    },
    Raw {
        id: ServoId,
        param: String,
        raw: i64,
    },
    Sync {
        param: String,
        values: Vec<(ServoId, Value)>,
    },
}

#[derive(Default)]
struct MockState {
    servos: BTreeMap<ServoId, HashMap<String, Value>>,
    unresponsive: BTreeSet<ServoId>,
    dead: bool,
    writes: Vec<WriteRecord>,
    sync_reads: Vec<String>,
}

/// A simple in-process servo bus. Each bus instance is independent.
///
/// Servos answer instantly; a raw `goal_position` write moves `present_position`
/// to the goal so position feedback flows are testable.
pub struct MockBus {
    name: String,
    state: Mutex<MockState>,
}

impl MockBus {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a servo with a plausible register set.
    pub fn add_servo(&self, id: ServoId) {
        let mut regs = HashMap::new();
        for (name, value) in default_registers() {
            regs.insert(name.to_string(), value);
        }
        self.state.lock().servos.insert(id, regs);
    }

    pub fn set(&self, id: ServoId, param: &str, value: Value) {
        if let Some(regs) = self.state.lock().servos.get_mut(&id) {
            regs.insert(param.to_string(), value);
        }
    }

    pub fn get(&self, id: ServoId, param: &str) -> Option<Value> {
        self.state
            .lock()
            .servos
            .get(&id)
            .and_then(|regs| regs.get(param).copied())
    }

    /// Make one servo stop answering (reads and acknowledged writes fail).
    pub fn set_unresponsive(&self, id: ServoId, unresponsive: bool) {
        let mut st = self.state.lock();
        if unresponsive {
            st.unresponsive.insert(id);
        } else {
            st.unresponsive.remove(&id);
        }
    }

    /// Simulate an unplugged adapter: every operation fails.
    pub fn set_dead(&self, dead: bool) {
        self.state.lock().dead = dead;
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Register names of every fast sync read issued so far.
    pub fn sync_reads(&self) -> Vec<String> {
        self.state.lock().sync_reads.clone()
    }

    fn check_alive(st: &MockState) -> Result<()> {
        if st.dead {
            Err(TransportError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn read_one(st: &MockState, id: ServoId, param: &str) -> Result<Value> {
        if st.unresponsive.contains(&id) {
            return Err(TransportError::NoResponse(id.raw()));
        }
        let regs = st
            .servos
            .get(&id)
            .ok_or(TransportError::NoResponse(id.raw()))?;
        regs.get(param)
            .copied()
            .ok_or_else(|| TransportError::UnknownParam(param.to_string()))
    }

    fn store(st: &mut MockState, id: ServoId, param: &str, value: Value) -> Result<()> {
        let regs = st
            .servos
            .get_mut(&id)
            .ok_or(TransportError::NoResponse(id.raw()))?;
        regs.insert(param.to_string(), value);
        Ok(())
    }
}

fn default_registers() -> [(&'static str, Value); 16] {
    [
        ("model_number", Value::Int(1060)),
        ("firmware_version", Value::Int(46)),
        ("return_delay_time", Value::Int(250)),
        ("operating_mode", Value::Int(3)),
        ("velocity_limit", Value::Int(265)),
        ("temperature_limit", Value::Int(72)),
        ("torque_enable", Value::Bool(false)),
        ("led", Value::Bool(false)),
        ("position_p_gain", Value::Int(800)),
        ("profile_velocity", Value::Int(0)),
        ("goal_position", Value::Int(2048)),
        ("present_position", Value::Float(180.0)),
        ("present_temperature", Value::Float(30.0)),
        ("present_input_voltage", Value::Float(12.0)),
        ("present_current", Value::Float(0.0)),
        ("hardware_error_status", Value::Int(0)),
    ]
}

impl Connect for MockBus {
    /// Accepts `mock` or `mock:<id>,<id>,...`; listed ids are attached.
    fn open(port: &str, _baud_rate: u32) -> Result<Self> {
        let rest = port
            .strip_prefix("mock")
            .ok_or_else(|| TransportError::InterfaceNotFound(port.to_string()))?;
        let bus = MockBus::new(port);
        if let Some(list) = rest.strip_prefix(':') {
            for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let raw: u8 = part
                    .parse()
                    .map_err(|_| TransportError::InterfaceNotFound(port.to_string()))?;
                bus.add_servo(ServoId::try_from(raw)?);
            }
        } else if !rest.is_empty() {
            return Err(TransportError::InterfaceNotFound(port.to_string()));
        }
        Ok(bus)
    }
}

#[async_trait]
impl ServoTransport for MockBus {
    async fn read(&self, id: ServoId, param: &str) -> Result<Value> {
        let st = self.state.lock();
        Self::check_alive(&st)?;
        Self::read_one(&st, id, param)
    }

    async fn write(
        &self,
        id: ServoId,
        param: &str,
        value: Value,
        await_response: bool,
    ) -> Result<()> {
        let mut st = self.state.lock();
        Self::check_alive(&st)?;
        if await_response && st.unresponsive.contains(&id) {
            return Err(TransportError::NoResponse(id.raw()));
        }
        st.writes.push(WriteRecord::Write {
            id,
            param: param.to_string(),
            value,
        });
        Self::store(&mut st, id, param, value)
    }

    async fn write_raw(
        &self,
        id: ServoId,
        param: &str,
        raw: i64,
        await_response: bool,
    ) -> Result<()> {
        let mut st = self.state.lock();
        Self::check_alive(&st)?;
        if await_response && st.unresponsive.contains(&id) {
            return Err(TransportError::NoResponse(id.raw()));
        }
        st.writes.push(WriteRecord::Raw {
            id,
            param: param.to_string(),
            raw,
        });
        Self::store(&mut st, id, param, Value::Int(raw))?;
        if param == "goal_position" {
            let degrees = raw as f64 * 360.0 / MOCK_RESOLUTION;
            Self::store(&mut st, id, "present_position", Value::Float(degrees))?;
        }
        Ok(())
    }

    async fn sync_write(&self, param: &str, values: &[(ServoId, Value)]) -> Result<()> {
        let mut st = self.state.lock();
        Self::check_alive(&st)?;
        st.writes.push(WriteRecord::Sync {
            param: param.to_string(),
            values: values.to_vec(),
        });
        // Sync writes are unacknowledged; absent servos simply miss the packet
        for (id, value) in values {
            if let Some(regs) = st.servos.get_mut(id) {
                regs.insert(param.to_string(), *value);
            }
        }
        Ok(())
    }

    async fn fast_sync_read(
        &self,
        ids: &[ServoId],
        param: &str,
    ) -> Result<Vec<(ServoId, Result<Value>)>> {
        let mut st = self.state.lock();
        Self::check_alive(&st)?;
        st.sync_reads.push(param.to_string());
        Ok(ids
            .iter()
            .map(|&id| (id, Self::read_one(&st, id, param)))
            .collect())
    }

    async fn ping(&self, id: Option<ServoId>) -> Result<Vec<PingInfo>> {
        let st = self.state.lock();
        Self::check_alive(&st)?;
        let info = |id: ServoId, regs: &HashMap<String, Value>| PingInfo {
            id,
            model_number: regs
                .get("model_number")
                .and_then(Value::as_i64)
                .unwrap_or_default() as u16,
            firmware_version: regs
                .get("firmware_version")
                .and_then(Value::as_i64)
                .unwrap_or_default() as u8,
        };
        match id {
            Some(id) => {
                if st.unresponsive.contains(&id) {
                    return Err(TransportError::NoResponse(id.raw()));
                }
                let regs = st
                    .servos
                    .get(&id)
                    .ok_or(TransportError::NoResponse(id.raw()))?;
                Ok(vec![info(id, regs)])
            }
            None => Ok(st
                .servos
                .iter()
                .filter(|(id, _)| !st.unresponsive.contains(id))
                .map(|(id, regs)| info(*id, regs))
                .collect()),
        }
    }
}

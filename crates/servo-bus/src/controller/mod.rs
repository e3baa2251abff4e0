//! The bus controller: a single task that owns the transport, keeps the servo
//! registry, polls feedback and serialises every bus access.

mod disarm;
mod state;
mod status;

pub use disarm::DisarmSnapshot;
pub use status::StatusSnapshot;

use crate::config::ControllerOptions;
use crate::error::{ControllerError, Result};
use crate::metrics::MetricsHub;
use crate::pubsub::EventBus;
use control_table::ControlTable;
use safety_guard::SafetyController;
use servo_transport::{Connect, PingInfo, ServoId, ServoTransport, Value};
use state::ControllerState;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// What an actuator tells the controller about the servo it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoRegistration {
    pub device_id: ServoId,
    pub joint: String,
    /// Joint angle (radians) at the servo's mechanical centre
    pub center_angle: f64,
    /// Raw units
    pub position_deadband: u32,
    pub reverse: bool,
}

pub(crate) enum Request {
    Register {
        registration: ServoRegistration,
        reply: oneshot::Sender<Result<()>>,
    },
    Read {
        id: ServoId,
        param: String,
        reply: oneshot::Sender<Result<Value>>,
    },
    Write {
        id: ServoId,
        param: String,
        value: Value,
        await_response: bool,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    WriteRaw {
        id: ServoId,
        param: String,
        raw: i64,
        await_response: bool,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    ListDevices {
        reply: oneshot::Sender<Vec<ServoId>>,
    },
    ControlTable {
        reply: oneshot::Sender<ControlTable>,
    },
    Ping {
        id: Option<ServoId>,
        reply: oneshot::Sender<Result<Vec<PingInfo>>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct Controller;

impl Controller {
    /// Open the bus with `T` and start the controller task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T>(
        options: ControllerOptions,
        safety: Arc<dyn SafetyController>,
        events: Arc<dyn EventBus>,
    ) -> Result<ControllerHandle>
    where
        T: Connect + ServoTransport + 'static,
    {
        let transport =
            T::open(&options.port, options.baud_rate).map_err(ControllerError::Startup)?;
        Self::spawn_with_transport(options, Arc::new(transport), safety, events)
    }

    /// Start the controller task on an already open transport.
    pub fn spawn_with_transport(
        options: ControllerOptions,
        transport: Arc<dyn ServoTransport>,
        safety: Arc<dyn SafetyController>,
        events: Arc<dyn EventBus>,
    ) -> Result<ControllerHandle> {
        let metrics = MetricsHub::new().map_err(ControllerError::Metrics)?;
        let transitions = safety.subscribe();
        let name: Arc<str> = Arc::from(options.name.as_str());
        let robot: Arc<str> = Arc::from(options.robot.as_str());
        let state = ControllerState::new(options, transport, safety, events, metrics.clone());
        // A disarm before the first servo registers must still find a hook
        state.publish_safety_snapshot()?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(state.run(rx, transitions));
        info!(controller = %name, "controller task spawned");
        Ok(ControllerHandle {
            tx,
            name,
            robot,
            metrics,
        })
    }
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Request>,
    name: Arc<str>,
    robot: Arc<str>,
    metrics: MetricsHub,
}

impl ControllerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Robot the controller reports faults for.
    pub fn robot(&self) -> &str {
        &self.robot
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| ControllerError::Unavailable)?;
        rx.await.map_err(|_| ControllerError::Unavailable)
    }

    /// Add or replace a servo in the registry.
    pub async fn register(&self, registration: ServoRegistration) -> Result<()> {
        self.call(|reply| Request::Register {
            registration,
            reply,
        })
        .await?
    }

    pub async fn read(&self, id: ServoId, param: &str) -> Result<Value> {
        self.call(|reply| Request::Read {
            id,
            param: param.to_string(),
            reply,
        })
        .await?
    }

    pub async fn write(
        &self,
        id: ServoId,
        param: &str,
        value: Value,
        await_response: bool,
    ) -> Result<()> {
        self.call(|reply| Request::Write {
            id,
            param: param.to_string(),
            value,
            await_response,
            reply: Some(reply),
        })
        .await?
    }

    pub async fn write_raw(
        &self,
        id: ServoId,
        param: &str,
        raw: i64,
        await_response: bool,
    ) -> Result<()> {
        self.call(|reply| Request::WriteRaw {
            id,
            param: param.to_string(),
            raw,
            await_response,
            reply: Some(reply),
        })
        .await?
    }

    /// Queue a raw write without waiting for the bus. Transport errors are
    /// logged by the controller.
    pub fn write_raw_nowait(&self, id: ServoId, param: &str, raw: i64) -> Result<()> {
        self.tx
            .send(Request::WriteRaw {
                id,
                param: param.to_string(),
                raw,
                await_response: false,
                reply: None,
            })
            .map_err(|_| ControllerError::Unavailable)
    }

    /// Registered servo ids, ascending.
    pub async fn list_devices(&self) -> Result<Vec<ServoId>> {
        self.call(|reply| Request::ListDevices { reply }).await
    }

    pub async fn control_table(&self) -> Result<ControlTable> {
        self.call(|reply| Request::ControlTable { reply }).await
    }

    /// Ping one servo, or broadcast when `id` is `None`.
    pub async fn ping(&self, id: Option<ServoId>) -> Result<Vec<PingInfo>> {
        self.call(|reply| Request::Ping { id, reply }).await?
    }

    /// Stop the controller task. The registry is dropped with it.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}

use crate::types::{
    ArmState, ReportedFault, SafetyEvent, SafetyEventType, SafetyFault, StateTransition,
    ViolationSeverity,
};
use crate::{Registration, Result, SafetyController, SafetyError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const TRANSITION_CAPACITY: usize = 64;
const DEFAULT_DISARM_TIMEOUT: Duration = Duration::from_millis(500);

type EventCallback = Box<dyn Fn(SafetyEvent) + Send + Sync>;

struct MonitorState {
    arm_state: ArmState,
    registrations: BTreeMap<String, Registration>,
    faults: Vec<ReportedFault>,
}

/// Outcome of a disarm sweep
#[derive(Debug, Clone, Default)]
pub struct DisarmReport {
    pub attempted: usize,
    pub failures: Vec<SafetyError>,
}

impl DisarmReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-process safety system: keeps the latest registration per component,
/// records faults and drives arm/disarm transitions.
pub struct SafetyMonitor {
    state: Mutex<MonitorState>,
    transitions: broadcast::Sender<StateTransition>,
    event_callback: Mutex<Option<EventCallback>>,
    disarm_timeout: Duration,
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyMonitor {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            state: Mutex::new(MonitorState {
                arm_state: ArmState::Disarmed,
                registrations: BTreeMap::new(),
                faults: Vec::new(),
            }),
            transitions,
            event_callback: Mutex::new(None),
            disarm_timeout: DEFAULT_DISARM_TIMEOUT,
        }
    }

    /// Upper bound on how long a single disarm hook may run.
    pub fn with_disarm_timeout(mut self, timeout: Duration) -> Self {
        self.disarm_timeout = timeout;
        self
    }

    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(SafetyEvent) + Send + Sync + 'static,
    {
        *self.event_callback.lock() = Some(Box::new(callback));
    }

    pub fn arm_state(&self) -> ArmState {
        self.state.lock().arm_state
    }

    /// Names of every registered component, sorted.
    pub fn registered(&self) -> Vec<String> {
        self.state.lock().registrations.keys().cloned().collect()
    }

    pub fn registration(&self, component: &str) -> Option<Registration> {
        self.state.lock().registrations.get(component).cloned()
    }

    pub fn faults(&self) -> Vec<ReportedFault> {
        self.state.lock().faults.clone()
    }

    pub fn arm(&self) -> Result<StateTransition> {
        let transition = {
            let mut st = self.state.lock();
            if st.arm_state == ArmState::Error {
                return Err(SafetyError::ArmRejected);
            }
            let from = st.arm_state;
            st.arm_state = ArmState::Armed;
            StateTransition {
                from,
                to: ArmState::Armed,
            }
        };
        info!("robot armed");
        self.emit(SafetyEventType::Armed, "robot armed".into(), ViolationSeverity::Warning);
        self.broadcast(transition);
        Ok(transition)
    }

    /// Run every registered disarm hook, then move to `Disarmed` (or stay in
    /// `Error`). Hook failures and timeouts are collected, never propagated.
    pub async fn disarm(&self) -> DisarmReport {
        let hooks: Vec<(String, Registration)> = {
            let st = self.state.lock();
            st.registrations
                .iter()
                .map(|(k, r)| (k.clone(), r.clone()))
                .collect()
        };

        let mut report = DisarmReport {
            attempted: hooks.len(),
            failures: Vec::new(),
        };
        for (component, registration) in hooks {
            let failure =
                match tokio::time::timeout(self.disarm_timeout, registration.hook.disarm()).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(_) => Some(SafetyError::DisarmTimeout(component.clone())),
                };
            if let Some(e) = failure {
                warn!(component = %component, error = %e, "disarm hook failed");
                self.emit(
                    SafetyEventType::DisarmFailed,
                    e.to_string(),
                    ViolationSeverity::Critical,
                );
                report.failures.push(e);
            }
        }

        let transition = {
            let mut st = self.state.lock();
            let from = st.arm_state;
            if from == ArmState::Error {
                None
            } else {
                st.arm_state = ArmState::Disarmed;
                Some(StateTransition {
                    from,
                    to: ArmState::Disarmed,
                })
            }
        };
        info!(hooks = report.attempted, "robot disarmed");
        self.emit(
            SafetyEventType::Disarmed,
            format!("{} component(s) disarmed", report.attempted),
            ViolationSeverity::Warning,
        );
        if let Some(t) = transition {
            self.broadcast(t);
        }
        report
    }

    /// Leave the error state after the operator has dealt with the fault.
    pub fn reset(&self) -> Option<StateTransition> {
        let transition = {
            let mut st = self.state.lock();
            if st.arm_state != ArmState::Error {
                return None;
            }
            st.arm_state = ArmState::Disarmed;
            StateTransition {
                from: ArmState::Error,
                to: ArmState::Disarmed,
            }
        };
        self.emit(
            SafetyEventType::SystemRecovery,
            "error state cleared".into(),
            ViolationSeverity::Warning,
        );
        self.broadcast(transition);
        Some(transition)
    }

    fn broadcast(&self, transition: StateTransition) {
        // No subscribers is fine
        let _ = self.transitions.send(transition);
    }

    fn emit(&self, event_type: SafetyEventType, message: String, severity: ViolationSeverity) {
        if let Some(callback) = self.event_callback.lock().as_ref() {
            callback(SafetyEvent {
                timestamp: SystemTime::now(),
                event_type,
                message,
                severity,
            });
        }
    }
}

impl SafetyController for SafetyMonitor {
    fn register(&self, component: &str, registration: Registration) -> Result<()> {
        if registration.path.is_empty() {
            return Err(SafetyError::EmptyPath(component.to_string()));
        }
        self.state
            .lock()
            .registrations
            .insert(component.to_string(), registration);
        self.emit(
            SafetyEventType::ComponentRegistered,
            format!("component '{component}' registered"),
            ViolationSeverity::Warning,
        );
        Ok(())
    }

    fn report_error(&self, robot: &str, path: &[String], fault: SafetyFault) {
        error!(
            robot,
            path = %path.join("/"),
            severity = ?fault.severity,
            "{}",
            fault.message
        );
        let message = format!("{}: {}", path.join("/"), fault.message);
        let severity = fault.severity;
        let transition = {
            let mut st = self.state.lock();
            st.faults.push(ReportedFault {
                robot: robot.to_string(),
                path: path.to_vec(),
                fault,
            });
            if severity >= ViolationSeverity::Critical && st.arm_state == ArmState::Armed {
                st.arm_state = ArmState::Error;
                Some(StateTransition {
                    from: ArmState::Armed,
                    to: ArmState::Error,
                })
            } else {
                None
            }
        };
        self.emit(SafetyEventType::FaultReported, message, severity);
        if let Some(t) = transition {
            self.broadcast(t);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    fn arm_state(&self) -> ArmState {
        SafetyMonitor::arm_state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaultCategory;
    use crate::DisarmHook;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl DisarmHook for CountingHook {
        async fn disarm(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl DisarmHook for FailingHook {
        async fn disarm(&self) -> Result<()> {
            Err(SafetyError::DisarmFailed {
                component: "failing".into(),
                reason: "bus gone".into(),
            })
        }
    }

    struct StuckHook;

    #[async_trait]
    impl DisarmHook for StuckHook {
        async fn disarm(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn registration(hook: Arc<dyn DisarmHook>) -> Registration {
        Registration {
            robot: "arm".into(),
            path: vec!["controller".into()],
            hook,
        }
    }

    #[test]
    fn test_register_replaces_previous() {
        let monitor = SafetyMonitor::new();
        let count = Arc::new(AtomicUsize::new(0));
        monitor
            .register("bus", registration(Arc::new(CountingHook(count.clone()))))
            .unwrap();
        monitor
            .register("bus", registration(Arc::new(CountingHook(count))))
            .unwrap();
        assert_eq!(monitor.registered(), vec!["bus".to_string()]);
    }

    #[test]
    fn test_register_rejects_empty_path() {
        let monitor = SafetyMonitor::new();
        let mut reg = registration(Arc::new(FailingHook));
        reg.path.clear();
        assert_eq!(
            monitor.register("bus", reg).unwrap_err(),
            SafetyError::EmptyPath("bus".into())
        );
    }

    #[tokio::test]
    async fn test_arm_and_disarm_broadcast_transitions() {
        let monitor = SafetyMonitor::new();
        let mut rx = monitor.subscribe();
        let count = Arc::new(AtomicUsize::new(0));
        monitor
            .register("bus", registration(Arc::new(CountingHook(count.clone()))))
            .unwrap();

        monitor.arm().unwrap();
        assert_eq!(rx.recv().await.unwrap().to, ArmState::Armed);

        let report = monitor.disarm().await;
        assert!(report.is_clean());
        assert_eq!(report.attempted, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(rx.recv().await.unwrap().to, ArmState::Disarmed);
        assert_eq!(monitor.arm_state(), ArmState::Disarmed);
    }

    #[tokio::test]
    async fn test_disarm_collects_failures_and_timeouts() {
        let monitor = SafetyMonitor::new().with_disarm_timeout(Duration::from_millis(20));
        monitor
            .register("a", registration(Arc::new(FailingHook)))
            .unwrap();
        monitor
            .register("b", registration(Arc::new(StuckHook)))
            .unwrap();
        let report = monitor.disarm().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .contains(&SafetyError::DisarmTimeout("b".into())));
    }

    #[test]
    fn test_critical_fault_while_armed_enters_error() {
        let monitor = SafetyMonitor::new();
        monitor.arm().unwrap();
        let fault = SafetyFault::new(
            FaultCategory::Hardware,
            ViolationSeverity::Critical,
            "overload".into(),
        )
        .with_context("bitmask", 32);
        monitor.report_error("arm", &["bus".into(), "elbow".into()], fault);

        assert_eq!(monitor.arm_state(), ArmState::Error);
        assert_eq!(monitor.arm().unwrap_err(), SafetyError::ArmRejected);
        let faults = monitor.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].path, vec!["bus".to_string(), "elbow".to_string()]);
        assert_eq!(faults[0].fault.context["bitmask"], 32);

        assert!(monitor.reset().is_some());
        assert!(monitor.arm().is_ok());
    }

    #[test]
    fn test_event_callback_sees_registrations() {
        let monitor = SafetyMonitor::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        monitor.set_event_callback(move |event| {
            if event.event_type == SafetyEventType::ComponentRegistered {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        monitor
            .register("bus", registration(Arc::new(FailingHook)))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}

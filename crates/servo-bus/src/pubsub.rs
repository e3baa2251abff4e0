//! Hierarchical publish/subscribe.
//!
//! Paths are lists of segments; a subscription to a prefix receives every
//! message published at or below it.

use crate::messages::{Envelope, Payload};
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::mpsc;

pub trait EventBus: Send + Sync {
    fn publish(&self, path: Vec<String>, payload: Payload);

    fn subscribe(&self, prefix: Vec<String>) -> mpsc::UnboundedReceiver<Envelope>;
}

/// Build a path from string segments.
pub fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

struct Subscriber {
    prefix: Vec<String>,
    tx: mpsc::UnboundedSender<Envelope>,
}

/// In-process event bus. Delivery per subscriber follows publish order.
#[derive(Default)]
pub struct LocalEventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    history: Option<Mutex<Vec<Envelope>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that also keeps every published envelope.
    pub fn recording() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            history: Some(Mutex::new(Vec::new())),
        }
    }

    pub fn history(&self) -> Vec<Envelope> {
        self.history
            .as_ref()
            .map(|h| h.lock().clone())
            .unwrap_or_default()
    }

    /// Recorded envelopes published at or below `prefix`.
    pub fn history_under(&self, prefix: &[&str]) -> Vec<Envelope> {
        self.history()
            .into_iter()
            .filter(|e| starts_with(&e.path, prefix))
            .collect()
    }

    pub fn clear_history(&self) {
        if let Some(h) = &self.history {
            h.lock().clear();
        }
    }
}

fn starts_with<S: AsRef<str>>(path: &[String], prefix: &[S]) -> bool {
    path.len() >= prefix.len() && path.iter().zip(prefix).all(|(a, b)| a == b.as_ref())
}

impl EventBus for LocalEventBus {
    fn publish(&self, path: Vec<String>, payload: Payload) {
        let envelope = Envelope {
            path,
            timestamp: OffsetDateTime::now_utc(),
            payload,
        };
        if let Some(h) = &self.history {
            h.lock().push(envelope.clone());
        }
        let mut subs = self.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        for sub in subs.iter() {
            if starts_with(&envelope.path, &sub.prefix) {
                let _ = sub.tx.send(envelope.clone());
            }
        }
    }

    fn subscribe(&self, prefix: Vec<String>) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { prefix, tx });
        rx
    }
}

//! Typed event bus for engine notifications.
//!
//! # Responsibilities
//! - Publish backend health transitions, pool/rule changes, metric snapshots
//! - Let external collaborators subscribe without coupling to internals
//!
//! # Design Decisions
//! - One broadcast channel carrying a typed enum, no string-keyed events
//! - Lagging subscribers drop old events rather than blocking publishers

use tokio::sync::broadcast;

use crate::observability::metrics::MetricsSnapshot;

/// Engine-level notification.
#[derive(Debug, Clone)]
pub enum Event {
    /// A backend crossed the failure threshold and was marked unhealthy.
    BackendFailed { pool: String, backend: String },
    /// A previously unhealthy backend passed a probe and was restored.
    BackendRecovered { pool: String, backend: String },
    PoolAdded { pool: String },
    PoolRemoved { pool: String },
    RuleAdded { rule: String },
    RuleRemoved { rule: String },
    /// Periodic aggregate published by the metrics collector.
    MetricsSnapshot(MetricsSnapshot),
}

/// Broadcast fan-out for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Events with no subscribers are dropped silently.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

use tokio::sync::broadcast;

/// Lifecycle notifications from the surrounding platform.
/// Delivered at-most-once per occurrence; there is no replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A user account was removed upstream.
    UserRemoved { user_id: String },
    /// A back-end worker was deregistered upstream.
    BackendRemoved { backend_id: String },
}

/// Broadcast bus carrying lifecycle events to whoever subscribed
/// during startup wiring.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Publish an event to every current subscriber. Dropped silently
    /// when no subscriber exists.
    pub fn publish(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

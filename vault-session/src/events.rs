//! Lifecycle event publishing.
//!
//! Events are read-only notifications. They are delivered synchronously to
//! registered listeners and to every subscriber of the broadcast stream.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Listener callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out of lifecycle events.
pub struct EventPublisher<E> {
    sender: broadcast::Sender<E>,
    listeners: RwLock<Vec<Listener<E>>>,
}

impl<E: Clone + Send + 'static> EventPublisher<E> {
    /// Publisher whose stream buffers `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to the event stream. Slow subscribers observe `Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Register a listener invoked on the publishing task.
    pub fn add_listener(&self, listener: impl Fn(&E) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to listeners, then to stream subscribers.
    pub fn publish(&self, event: E) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener(&event);
        }
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl<E: Clone + Send + 'static> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

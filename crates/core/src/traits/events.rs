use async_trait::async_trait;
use std::sync::Mutex;

use crate::events::{EventEnvelope, EventType};

/// Trait for emitting structured events.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emit an event.
    async fn emit(&self, event: EventEnvelope);
}

/// No-op implementation for testing/default.
pub struct NoOpEventEmitter;

#[async_trait]
impl EventEmitter for NoOpEventEmitter {
    async fn emit(&self, _event: EventEnvelope) {}
}

/// Keeps every emitted event in memory.
#[derive(Default)]
pub struct RecordingEventEmitter {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event types in emission order.
    pub fn event_types(&self) -> Vec<EventType> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventEmitter for RecordingEventEmitter {
    async fn emit(&self, event: EventEnvelope) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

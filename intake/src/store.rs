//! Bounded, insertion-ordered, in-memory event store.
//!
//! One store instance is created at server startup and shared by every
//! request handler. A single mutex is plenty for dev/test traffic; `add` and
//! `flush` are atomic with respect to readers, so the store is never
//! observed over capacity or mid-eviction.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::event::{Event, EventBody};

/// Oldest events are evicted (FIFO) once the store grows past this.
pub const MAX_EVENTS: usize = 100;

#[derive(Default)]
pub struct EventStore {
    events: Mutex<VecDeque<Event>>,
}

impl EventStore {
    pub fn new() -> EventStore {
        EventStore::default()
    }

    /// Appends a new record under a fresh id and evicts from the front while
    /// over capacity. Returns the generated id.
    pub fn add(
        &self,
        project_id: u64,
        envelope_header: Option<Value>,
        header: Option<Value>,
        body: EventBody,
    ) -> Uuid {
        let event_id = Uuid::now_v7();
        let mut events = self.lock();
        events.push_back(Event {
            project_id,
            event_id,
            envelope_header,
            header,
            body,
        });
        while events.len() > MAX_EVENTS {
            events.pop_front();
        }
        event_id
    }

    /// Linear scan; fine at a 100-entry cap.
    pub fn get(&self, event_id: Uuid) -> Option<Event> {
        self.lock()
            .iter()
            .find(|event| event.event_id == event_id)
            .cloned()
    }

    /// Current contents, oldest first.
    pub fn list(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().expect("event store lock poisoned")
    }
}

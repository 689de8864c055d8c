//! In-memory event store implementing the `Timeline` port.
//!
//! Events are ordered by `(time, id)`, so events at the same time fire in
//! scheduling order. The store never runs callbacks itself: the embedding
//! simulation pops the next action and routes it.

use std::collections::{BTreeMap, HashMap};

use shared_types::Picoseconds;
use tracing::trace;

use crate::ports::{EventAction, EventId, Timeline};

/// Ordered pending-event store with a monotonic clock.
#[derive(Debug, Default)]
pub struct InMemoryTimeline {
    now: Picoseconds,
    next_id: u64,
    queue: BTreeMap<(Picoseconds, EventId), EventAction>,
    times: HashMap<EventId, Picoseconds>,
}

impl InMemoryTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<Picoseconds> {
        self.queue.keys().next().map(|(time, _)| *time)
    }

    /// Move the clock forward without firing anything. Never moves back.
    pub fn advance_to(&mut self, time: Picoseconds) {
        self.now = self.now.max(time);
    }

    /// Remove the earliest event and advance the clock to it.
    pub fn pop_next(&mut self) -> Option<(EventId, Picoseconds, EventAction)> {
        let ((time, id), action) = self.queue.pop_first()?;
        self.times.remove(&id);
        self.now = self.now.max(time);
        trace!(?id, time, ?action, "event fired");
        Some((id, time, action))
    }

    /// Pending actions in firing order.
    pub fn events(&self) -> impl Iterator<Item = (Picoseconds, &EventAction)> {
        self.queue.iter().map(|((time, _), action)| (*time, action))
    }
}

impl Timeline for InMemoryTimeline {
    fn now(&self) -> Picoseconds {
        self.now
    }

    fn schedule(&mut self, time: Picoseconds, action: EventAction) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.insert((time, id), action);
        self.times.insert(id, time);
        id
    }

    fn remove_event(&mut self, id: EventId) {
        if let Some(time) = self.times.remove(&id) {
            self.queue.remove(&(time, id));
        }
    }

    fn update_event_time(&mut self, id: EventId, time: Picoseconds) {
        let Some(old) = self.times.get_mut(&id) else {
            return;
        };
        if let Some(action) = self.queue.remove(&(*old, id)) {
            *old = time;
            self.queue.insert((time, id), action);
        }
    }

    fn event_time(&self, id: EventId) -> Option<Picoseconds> {
        self.times.get(&id).copied()
    }
}

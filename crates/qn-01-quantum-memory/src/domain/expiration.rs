//! Single pending expiration event per memory.

use shared_types::Picoseconds;
use tracing::trace;

use crate::ports::{EventAction, EventId, Timeline};

/// Scheduled expiration: event handle plus its firing time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationHandle {
    pub id: EventId,
    pub time: Picoseconds,
}

/// Holds at most one outstanding expiration event.
///
/// Scheduling always removes the previous event from the timeline first, so
/// a stale expiration can never fire against a rewritten state.
#[derive(Clone, Debug, Default)]
pub struct ExpirationSlot {
    pending: Option<ExpirationHandle>,
}

impl ExpirationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending expiration with one at `time`.
    pub fn schedule(&mut self, timeline: &mut dyn Timeline, memory: &str, time: Picoseconds) {
        self.cancel(timeline);
        let id = timeline.schedule(
            time,
            EventAction::Expire {
                memory: memory.to_string(),
            },
        );
        trace!(memory, time, ?id, "expiration scheduled");
        self.pending = Some(ExpirationHandle { id, time });
    }

    /// Move the pending expiration to `time` (never earlier than now), or
    /// schedule one if none is pending.
    pub fn update(&mut self, timeline: &mut dyn Timeline, memory: &str, time: Picoseconds) {
        let time = time.max(timeline.now());
        match self.pending.as_mut() {
            Some(handle) => {
                timeline.update_event_time(handle.id, time);
                handle.time = time;
            }
            None => self.schedule(timeline, memory, time),
        }
    }

    pub fn cancel(&mut self, timeline: &mut dyn Timeline) {
        if let Some(handle) = self.pending.take() {
            timeline.remove_event(handle.id);
        }
    }

    /// Forget the handle of an event that has just fired.
    pub fn fired(&mut self) {
        self.pending = None;
    }

    pub fn expire_time(&self) -> Option<Picoseconds> {
        self.pending.map(|h| h.time)
    }

    pub fn handle(&self) -> Option<ExpirationHandle> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

//! # Event Scheduler
//!
//! Deferred callbacks keyed by an absolute trigger time on the cycle clock.
//! The engine advances the clock by the cost of every retired instruction
//! and fires whatever became due.
//!
//! Nodes sit in a min-heap ordered by `(time, sequence)`, so equal trigger
//! times fire in scheduling order. Cancelling only drops the callback; the
//! heap entry is skipped when it surfaces.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::cpu::exception::InterruptLines;

/// Handle returned by [`Scheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

pub type EventCallback = Box<dyn FnOnce(&mut EventContext<'_>)>;

/// What a firing callback can touch.
pub struct EventContext<'a> {
    scheduler: &'a mut Scheduler,
    lines: &'a mut InterruptLines,
    stop: &'a mut bool,
}

impl EventContext<'_> {
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.scheduler.now
    }

    /// Schedules a follow-up. It becomes eligible on the next advance at the
    /// earliest, even with a zero delay.
    pub fn schedule(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut EventContext<'_>) + 'static,
    ) -> EventId {
        self.scheduler.schedule(delay, callback)
    }

    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    pub const fn set_irq(&mut self, level: bool) {
        self.lines.irq = level;
    }

    pub const fn set_fiq(&mut self, level: bool) {
        self.lines.fiq = level;
    }

    pub const fn set_reset(&mut self, level: bool) {
        self.lines.reset = level;
    }

    /// Ends the current run at the next instruction boundary.
    pub const fn request_stop(&mut self) {
        *self.stop = true;
    }
}

#[derive(Default)]
pub struct Scheduler {
    now: u64,
    next_sequence: u64,
    queue: BinaryHeap<Reverse<(u64, EventId)>>,
    callbacks: HashMap<EventId, EventCallback>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.now
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }

    pub fn schedule(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut EventContext<'_>) + 'static,
    ) -> EventId {
        let id = EventId(self.next_sequence);
        self.next_sequence += 1;

        let time = self.now.saturating_add(delay);
        self.queue.push(Reverse((time, id)));
        self.callbacks.insert(id, Box::new(callback));

        tracing::trace!("event {} scheduled at {time}", id.0);
        id
    }

    /// Returns `false` when the event already fired or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Drops every pending event and rewinds the clock.
    pub fn clear(&mut self) {
        self.now = 0;
        self.queue.clear();
        self.callbacks.clear();
    }

    /// Moves the clock forward by `cost` cycles and fires every due event in
    /// trigger order. Returns `true` when a callback asked to stop.
    pub fn advance(&mut self, cost: u64, lines: &mut InterruptLines) -> bool {
        self.now = self.now.saturating_add(cost);

        let mut due = Vec::new();
        while let Some(Reverse((time, id))) = self.queue.peek().copied() {
            if time > self.now {
                break;
            }
            self.queue.pop();
            due.push(id);
        }

        let mut stop = false;
        for id in due {
            // Cancelled, possibly by an earlier callback of this same pass.
            let Some(callback) = self.callbacks.remove(&id) else {
                continue;
            };

            tracing::debug!("event {} fired at {}", id.0, self.now);
            let mut context = EventContext {
                scheduler: &mut *self,
                lines: &mut *lines,
                stop: &mut stop,
            };
            callback(&mut context);
        }

        stop
    }
}

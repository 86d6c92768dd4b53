//! Time-ordered event scheduler.
//!
//! Events are keyed by `(fire_time, sequence)`. Fire times are rounded to a
//! fixed number of decimals when scheduled so that floating-point noise can
//! never invert the order of two events; the strictly increasing sequence
//! number breaks ties in FIFO order of scheduling.
//!
//! The queue never invokes anything itself. Callers pop events and dispatch
//! them, which keeps the payload type (`A`) plain data that can be
//! serialized with the rest of a snapshot.

use crate::id::EventId;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};
use tracing::trace;

/// Default number of decimals fire times are rounded to.
pub const DEFAULT_PRECISION: u32 = 4;

/// Largest rounding precision. An `f64` carries no more significant
/// decimals than this.
pub const MAX_PRECISION: u32 = 15;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised when scheduling.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("cannot schedule an event with delay {delay} (must be finite and non-negative)")]
    InvalidSchedule { delay: f64 },
}

// ---------------------------------------------------------------------------
// Scheduled events
// ---------------------------------------------------------------------------

/// Short human-readable name of an event payload, used by the event log.
pub trait EventLabel {
    fn label(&self) -> &'static str;
}

/// A payload waiting in the queue with its absolute fire time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent<A> {
    pub at: f64,
    pub id: EventId,
    pub action: A,
}

impl<A> PartialEq for ScheduledEvent<A> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<A> Eq for ScheduledEvent<A> {}

impl<A> PartialOrd for ScheduledEvent<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for ScheduledEvent<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// One executed event, recorded when the event log is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub event_id: EventId,
    pub time: f64,
    pub label: String,
}

/// Round `value` to `decimals` decimal places. Values too large to scale
/// are returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(MAX_PRECISION) as i32);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// A min-priority queue of pending events plus the simulation clock.
#[derive(Debug, Clone)]
pub struct EventQueue<A> {
    heap: BinaryHeap<Reverse<ScheduledEvent<A>>>,
    now: f64,
    next_id: u64,
    precision: u32,
    /// Pending events that were cancelled; skipped when they reach the top.
    cancelled: BTreeSet<EventId>,
    log: Option<Vec<EventLogEntry>>,
}

impl<A> Default for EventQueue<A> {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

impl<A> EventQueue<A> {
    /// Create an empty queue at time 0 rounding fire times to `precision`
    /// decimals, capped at [`MAX_PRECISION`].
    pub fn new(precision: u32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            now: 0.0,
            next_id: 0,
            precision: precision.min(MAX_PRECISION),
            cancelled: BTreeSet::new(),
            log: None,
        }
    }

    /// Enable the executed-event log.
    pub fn with_event_log(mut self) -> Self {
        self.log = Some(Vec::new());
        self
    }

    /// Current simulation time. Only moves forward, and only on pop.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Number of live (not cancelled) pending events.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire time of the next live event.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    /// Executed-event log, if enabled.
    pub fn event_log(&self) -> Option<&[EventLogEntry]> {
        self.log.as_deref()
    }

    /// Schedule `action` to fire `delay` time units from now.
    ///
    /// A rejected delay leaves the queue untouched.
    pub fn schedule(&mut self, delay: f64, action: A) -> Result<EventId, ScheduleError> {
        let at = round_to(self.now + delay, self.precision);
        if !delay.is_finite() || delay < 0.0 || !at.is_finite() {
            return Err(ScheduleError::InvalidSchedule { delay });
        }
        let id = EventId(self.next_id);
        self.next_id += 1;
        trace!(event = id.0, now = self.now, at, "schedule");
        self.heap.push(Reverse(ScheduledEvent { at, id, action }));
        Ok(id)
    }

    /// Cancel a pending event. Returns `false` if no live event has this id.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.cancelled.contains(&id) || !self.heap.iter().any(|Reverse(e)| e.id == id) {
            return false;
        }
        self.cancelled.insert(id);
        self.discard_cancelled_head();
        true
    }

    /// Whether an event with this id is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        !self.cancelled.contains(&id) && self.heap.iter().any(|Reverse(e)| e.id == id)
    }

    /// Live pending events in firing order.
    pub fn pending(&self) -> Vec<&ScheduledEvent<A>> {
        let mut events: Vec<&ScheduledEvent<A>> = self
            .heap
            .iter()
            .map(|Reverse(e)| e)
            .filter(|e| !self.cancelled.contains(&e.id))
            .collect();
        events.sort();
        events
    }

    /// Remove the next event and advance the clock to its fire time.
    ///
    /// Events scheduled after this call returns are not visible to it.
    pub fn pop(&mut self) -> Option<ScheduledEvent<A>>
    where
        A: EventLabel,
    {
        let Reverse(event) = self.heap.pop()?;
        self.now = event.at;
        trace!(event = event.id.0, now = self.now, label = event.action.label(), "pop");
        if let Some(log) = self.log.as_mut() {
            log.push(EventLogEntry {
                event_id: event.id,
                time: event.at,
                label: event.action.label().to_string(),
            });
        }
        self.discard_cancelled_head();
        Some(event)
    }

    /// Pop the next event only if it fires at or before `max_time`.
    pub fn pop_due(&mut self, max_time: f64) -> Option<ScheduledEvent<A>>
    where
        A: EventLabel,
    {
        match self.peek_time() {
            Some(at) if at <= max_time => self.pop(),
            _ => None,
        }
    }

    /// Pop and hand every event due by `max_time` to `handler`, which may
    /// schedule further events on the queue. Remaining events stay queued,
    /// so a later call with a larger bound resumes correctly.
    pub fn run_until<E>(
        &mut self,
        max_time: f64,
        mut handler: impl FnMut(&mut Self, ScheduledEvent<A>) -> Result<(), E>,
    ) -> Result<usize, E>
    where
        A: EventLabel,
    {
        let mut executed = 0;
        while let Some(event) = self.pop_due(max_time) {
            handler(self, event)?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Keep the heap top live so `peek_time` and `len` never see a
    /// cancelled event.
    fn discard_cancelled_head(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if !self.cancelled.remove(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot form
// ---------------------------------------------------------------------------

/// Plain-data form of a queue used by snapshots. Cancelled events are
/// dropped, so the restored queue holds exactly the live pending set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueState<A> {
    pub now: f64,
    pub next_id: u64,
    pub precision: u32,
    pub pending: Vec<ScheduledEvent<A>>,
    pub log: Option<Vec<EventLogEntry>>,
}

impl<A: Clone> EventQueue<A> {
    pub fn to_state(&self) -> QueueState<A> {
        QueueState {
            now: self.now,
            next_id: self.next_id,
            precision: self.precision,
            pending: self.pending().into_iter().cloned().collect(),
            log: self.log.clone(),
        }
    }
}

impl<A> From<QueueState<A>> for EventQueue<A> {
    fn from(state: QueueState<A>) -> Self {
        Self {
            heap: state.pending.into_iter().map(Reverse).collect(),
            now: state.now,
            next_id: state.next_id,
            precision: state.precision.min(MAX_PRECISION),
            cancelled: BTreeSet::new(),
            log: state.log,
        }
    }
}

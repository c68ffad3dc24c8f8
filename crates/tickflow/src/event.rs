//! Logical clock and trigger events.
//!
//! Every event is tagged with the loop id active when it was created.
//! An event is actionable only while that loop id is still current; the
//! resolver advances the clock once per completed drain.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Classification of a value arriving at a trigger input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Actionable now.
    Trigger,
    /// Ignorable: stale tick, explicit suppression or a "not ready" sentinel.
    Void,
    /// Terminal failure, forwarded to listeners.
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Trigger,
    Void,
    Error(Arc<Value>),
}

/// A value produced by the engine to drive `#call`-style inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    kind: EventKind,
    loop_id: u64,
    /// Unique per event so two triggers in one tick are distinct values.
    seq: u64,
}

impl Event {
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn loop_id(&self) -> u64 {
        self.loop_id
    }

    /// Error detail, if this is an error event.
    pub fn detail(&self) -> Option<&Value> {
        match &self.kind {
            EventKind::Error(detail) => Some(&**detail),
            _ => None,
        }
    }

    /// Classify against the current tick.
    pub fn check(&self, clock: &Clock) -> EventType {
        match &self.kind {
            // Errors stay terminal regardless of age
            EventKind::Error(_) => EventType::Error,
            _ if self.loop_id != clock.loop_id => EventType::Void,
            EventKind::Trigger => EventType::Trigger,
            EventKind::Void => EventType::Void,
        }
    }

    /// Identity comparison used by dispatch.
    pub(crate) fn same(&self, other: &Event) -> bool {
        self.seq == other.seq && self.loop_id == other.loop_id
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::Trigger => write!(f, "Event(trigger@{})", self.loop_id),
            EventKind::Void => write!(f, "Event(void@{})", self.loop_id),
            EventKind::Error(detail) => write!(f, "Event(error@{}: {})", self.loop_id, detail),
        }
    }
}

/// Classify an arbitrary property value used as a trigger.
///
/// `Undefined` is void, events are checked against the clock, and any
/// other value counts as a trigger.
pub fn check_value(value: &Value, clock: &Clock) -> EventType {
    match value {
        Value::Undefined => EventType::Void,
        Value::Event(event) => event.check(clock),
        _ => EventType::Trigger,
    }
}

/// Monotonic logical clock.
#[derive(Debug, Default)]
pub struct Clock {
    loop_id: u64,
    next_seq: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current loop id.
    pub fn loop_id(&self) -> u64 {
        self.loop_id
    }

    /// Start a new tick; every event created so far becomes stale.
    pub fn advance(&mut self) {
        self.loop_id += 1;
    }

    fn event(&mut self, kind: EventKind) -> Event {
        self.next_seq += 1;
        Event { kind, loop_id: self.loop_id, seq: self.next_seq }
    }

    pub fn trigger(&mut self) -> Event {
        self.event(EventKind::Trigger)
    }

    pub fn void(&mut self) -> Event {
        self.event(EventKind::Void)
    }

    pub fn error(&mut self, detail: Value) -> Event {
        self.event(EventKind::Error(Arc::new(detail)))
    }
}

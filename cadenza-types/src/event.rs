//! Timed musical events and the streams that own them.

use serde::{Deserialize, Serialize};

use crate::{EventId, StreamId};

/// Tick position or length. Resolution is chosen by the host (see `ticks_per_beat`).
pub type Tick = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Note,
    Automation,
    Trigger,
}

/// Kind-specific event fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Note { pitch: u8, velocity: u8 },
    Automation { value: f32 },
    Trigger,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Note { .. } => EventKind::Note,
            EventPayload::Automation { .. } => EventKind::Automation,
            EventPayload::Trigger => EventKind::Trigger,
        }
    }

    /// False for automation values that JSON cannot carry (NaN, infinities).
    pub fn is_finite(&self) -> bool {
        match self {
            EventPayload::Automation { value } => value.is_finite(),
            _ => true,
        }
    }
}

/// A single timed occurrence. `id` and `kind` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    id: EventId,
    kind: EventKind,
    start: Tick,
    duration: Tick,
    payload: EventPayload,
}

#[derive(Deserialize)]
struct EventRecord {
    id: EventId,
    kind: EventKind,
    start: Tick,
    duration: Tick,
    payload: EventPayload,
}

impl TryFrom<EventRecord> for Event {
    type Error = String;

    fn try_from(r: EventRecord) -> Result<Self, Self::Error> {
        if !r.payload.is_finite() {
            return Err(format!("event {}: automation value is not finite", r.id));
        }
        if r.payload.kind() != r.kind {
            return Err(format!(
                "event {}: payload {:?} does not match kind {:?}",
                r.id,
                r.payload.kind(),
                r.kind
            ));
        }
        Ok(Event {
            id: r.id,
            kind: r.kind,
            start: r.start,
            duration: r.duration,
            payload: r.payload,
        })
    }
}

impl Event {
    /// The kind is taken from the payload.
    pub fn new(id: EventId, start: Tick, duration: Tick, payload: EventPayload) -> Self {
        Self {
            id,
            kind: payload.kind(),
            start,
            duration,
            payload,
        }
    }

    pub fn note(id: impl Into<String>, start: Tick, duration: Tick, pitch: u8, velocity: u8) -> Self {
        Self::new(
            EventId::new(id),
            start,
            duration,
            EventPayload::Note { pitch, velocity },
        )
    }

    pub fn automation(id: impl Into<String>, start: Tick, duration: Tick, value: f32) -> Self {
        Self::new(EventId::new(id), start, duration, EventPayload::Automation { value })
    }

    pub fn trigger(id: impl Into<String>, start: Tick) -> Self {
        Self::new(EventId::new(id), start, 1, EventPayload::Trigger)
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn start(&self) -> Tick {
        self.start
    }

    pub fn duration(&self) -> Tick {
        self.duration
    }

    pub fn end(&self) -> Tick {
        self.start.saturating_add(self.duration)
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Half-open overlap with `[range_start, range_end)`.
    pub fn overlaps(&self, range_start: Tick, range_end: Tick) -> bool {
        self.start < range_end && self.end() > range_start
    }

    /// Return a copy with `patch` applied.
    ///
    /// Panics if the patch carries a payload of a different kind; the kind of
    /// an event never changes.
    pub fn patched(&self, patch: &EventPatch) -> Event {
        let mut next = self.clone();
        if let Some(start) = patch.start {
            next.start = start;
        }
        if let Some(duration) = patch.duration {
            next.duration = duration;
        }
        if let Some(payload) = &patch.payload {
            assert_eq!(
                payload.kind(),
                self.kind,
                "event {} cannot change kind",
                self.id
            );
            next.payload = payload.clone();
        }
        next
    }
}

/// Partial update for an event's mutable fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub start: Option<Tick>,
    pub duration: Option<Tick>,
    pub payload: Option<EventPayload>,
}

impl EventPatch {
    pub fn move_to(start: Tick) -> Self {
        Self {
            start: Some(start),
            ..Default::default()
        }
    }

    pub fn resize(duration: Tick) -> Self {
        Self {
            duration: Some(duration),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.duration.is_none() && self.payload.is_none()
    }
}

/// Ordered-by-start container of events; the sole owner of event data.
///
/// Events with equal starts keep their insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StreamRecord")]
pub struct EventStream {
    pub id: StreamId,
    pub name: String,
    events: Vec<Event>,
    #[serde(skip)]
    longest: Tick,
}

#[derive(Deserialize)]
struct StreamRecord {
    id: StreamId,
    name: String,
    #[serde(default)]
    events: Vec<Event>,
}

impl TryFrom<StreamRecord> for EventStream {
    type Error = String;

    fn try_from(r: StreamRecord) -> Result<Self, Self::Error> {
        let mut stream = EventStream::new(r.id, r.name);
        let mut events = r.events;
        events.sort_by_key(|e| e.start);
        stream.longest = events.iter().map(|e| e.duration).max().unwrap_or(0);
        stream.events = events;
        if let Some(id) = stream.duplicate_event_id() {
            return Err(format!("stream {}: duplicate event id {}", stream.id, id));
        }
        Ok(stream)
    }
}

impl EventStream {
    pub fn new(id: StreamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            events: Vec::new(),
            longest: 0,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.events.iter().any(|e| &e.id == id)
    }

    pub fn event(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// The first event id that appears more than once, if any.
    pub fn duplicate_event_id(&self) -> Option<&EventId> {
        let mut seen = std::collections::HashSet::new();
        self.events.iter().map(|e| &e.id).find(|id| !seen.insert(*id))
    }

    /// Upper bound on any event's duration; lets range queries skip the head of the stream.
    pub fn longest_duration(&self) -> Tick {
        self.longest
    }

    /// Insert after every event starting at or before `event.start`.
    pub fn insert_sorted(&mut self, event: Event) {
        let pos = self.events.partition_point(|e| e.start <= event.start);
        self.longest = self.longest.max(event.duration);
        self.events.insert(pos, event);
    }

    pub fn remove(&mut self, id: &EventId) -> Option<Event> {
        let pos = self.events.iter().position(|e| &e.id == id)?;
        let removed = self.events.remove(pos);
        if removed.duration == self.longest {
            self.recompute_longest();
        }
        Some(removed)
    }

    /// Swap in a new version of an existing event, re-sorting if its start moved.
    pub fn replace(&mut self, next: Event) -> Option<Event> {
        let previous = self.remove(&next.id)?;
        self.insert_sorted(next);
        Some(previous)
    }

    fn recompute_longest(&mut self) {
        self.longest = self.events.iter().map(|e| e.duration).max().unwrap_or(0);
    }
}

/// The concrete change a store call applied. Enough to build the inverse
/// without re-reading state.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDiff {
    pub stream: StreamId,
    pub added: Vec<Event>,
    pub removed: Vec<Event>,
    /// `(before, after)` pairs.
    pub updated: Vec<(Event, Event)>,
}

impl EventDiff {
    pub fn empty(stream: StreamId) -> Self {
        Self {
            stream,
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    pub fn inverse(&self) -> EventDiff {
        EventDiff {
            stream: self.stream.clone(),
            added: self.removed.clone(),
            removed: self.added.clone(),
            updated: self
                .updated
                .iter()
                .map(|(before, after)| (after.clone(), before.clone()))
                .collect(),
        }
    }
}

//! Owner of every event stream. Knows nothing about clips or routing.

use std::collections::{HashMap, HashSet};

use cadenza_types::{
    CoreError, CoreResult, EntityKind, Event, EventDiff, EventId, EventPatch, EventStream,
    IdAllocator, StreamId, Tick,
};

use super::notify::{Callback, Notifier, SubscriptionId, Topic};

pub struct EventStore {
    streams: HashMap<StreamId, EventStream>,
    stream_order: Vec<StreamId>,
    stream_ids: IdAllocator,
    event_ids: IdAllocator,
    notifier: Notifier<StreamId>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            stream_order: Vec::new(),
            stream_ids: IdAllocator::new("stream"),
            event_ids: IdAllocator::new("event"),
            notifier: Notifier::new(),
        }
    }

    pub fn create_stream(&mut self, name: impl Into<String>) -> StreamId {
        let id = loop {
            let candidate = StreamId::new(self.stream_ids.next_raw());
            if !self.streams.contains_key(&candidate) {
                break candidate;
            }
        };
        let stream = EventStream::new(id.clone(), name);
        log::debug!(target: "events", "created stream {} ({})", id, stream.name);
        self.streams.insert(id.clone(), stream);
        self.stream_order.push(id.clone());
        self.notifier.notify(id.clone());
        id
    }

    /// Put back a whole stream (snapshot restore, undo of a destroy). The
    /// stream goes last in creation order.
    pub fn insert_stream(&mut self, stream: EventStream) -> CoreResult<()> {
        let end = self.stream_order.len();
        self.insert_stream_at(stream, end)
    }

    /// As `insert_stream`, placing the stream at `index` in creation order
    /// (clamped to the end).
    pub(crate) fn insert_stream_at(&mut self, stream: EventStream, index: usize) -> CoreResult<()> {
        if self.streams.contains_key(&stream.id) {
            return Err(CoreError::duplicate(EntityKind::Stream, &stream.id));
        }
        if let Some(dup) = stream.duplicate_event_id() {
            return Err(CoreError::duplicate(EntityKind::Event, dup));
        }
        if let Some(bad) = stream.events().iter().find(|e| !e.payload().is_finite()) {
            return Err(non_finite(bad));
        }
        self.stream_ids.observe(stream.id.as_str());
        for event in stream.events() {
            self.event_ids.observe(event.id().as_str());
        }
        let id = stream.id.clone();
        self.streams.insert(id.clone(), stream);
        self.stream_order.insert(index.min(self.stream_order.len()), id.clone());
        self.notifier.notify(id);
        Ok(())
    }

    /// Index of the stream in creation order.
    pub fn stream_position(&self, id: &StreamId) -> Option<usize> {
        self.stream_order.iter().position(|s| s == id)
    }

    pub fn get_stream(&self, id: &StreamId) -> Option<&EventStream> {
        self.streams.get(id)
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.streams.contains_key(id)
    }

    /// Remove a stream and hand it back. Reference checks are the caller's job.
    pub fn destroy_stream(&mut self, id: &StreamId) -> CoreResult<EventStream> {
        let stream = self
            .streams
            .remove(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Stream, id))?;
        self.stream_order.retain(|s| s != id);
        log::debug!(target: "events", "destroyed stream {} ({} events)", id, stream.len());
        self.notifier.notify(id.clone());
        Ok(stream)
    }

    /// Stream ids in creation order.
    pub fn stream_ids(&self) -> &[StreamId] {
        &self.stream_order
    }

    pub fn streams(&self) -> impl Iterator<Item = &EventStream> {
        self.stream_order.iter().filter_map(|id| self.streams.get(id))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// A fresh event id, unique across every stream of this store.
    pub fn next_event_id(&mut self) -> EventId {
        loop {
            let candidate = EventId::new(self.event_ids.next_raw());
            if !self.streams.values().any(|s| s.contains(&candidate)) {
                return candidate;
            }
        }
    }

    /// Insert events keeping start order. The batch is all-or-nothing: any id
    /// already in the stream (or repeated within the batch) rejects it.
    pub fn add_events(&mut self, stream_id: &StreamId, events: Vec<Event>) -> CoreResult<EventDiff> {
        let stream = self.stream_mut(stream_id)?;
        let mut seen = HashSet::new();
        for event in &events {
            if stream.contains(event.id()) || !seen.insert(event.id().clone()) {
                return Err(CoreError::duplicate(EntityKind::Event, event.id()));
            }
            if !event.payload().is_finite() {
                return Err(non_finite(event));
            }
        }
        for event in &events {
            stream.insert_sorted(event.clone());
        }
        for event in &events {
            self.event_ids.observe(event.id().as_str());
        }
        let mut diff = EventDiff::empty(stream_id.clone());
        diff.added = events;
        if !diff.is_empty() {
            self.notifier.notify(stream_id.clone());
        }
        Ok(diff)
    }

    /// Remove the given ids; ids that are not present are ignored.
    pub fn remove_events(&mut self, stream_id: &StreamId, ids: &[EventId]) -> CoreResult<EventDiff> {
        let stream = self.stream_mut(stream_id)?;
        let mut diff = EventDiff::empty(stream_id.clone());
        for id in ids {
            if let Some(removed) = stream.remove(id) {
                diff.removed.push(removed);
            }
        }
        if !diff.is_empty() {
            self.notifier.notify(stream_id.clone());
        }
        Ok(diff)
    }

    /// Change an event's start, duration or payload.
    pub fn update_event(
        &mut self,
        stream_id: &StreamId,
        event_id: &EventId,
        patch: &EventPatch,
    ) -> CoreResult<EventDiff> {
        let stream = self.stream_mut(stream_id)?;
        let before = stream
            .event(event_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(EntityKind::Event, event_id))?;
        let after = before.patched(patch);
        if !after.payload().is_finite() {
            return Err(non_finite(&after));
        }
        let mut diff = EventDiff::empty(stream_id.clone());
        if after != before {
            stream.replace(after.clone());
            diff.updated.push((before, after));
            self.notifier.notify(stream_id.clone());
        }
        Ok(diff)
    }

    /// Events overlapping `[range_start, range_end)`, ordered by start.
    pub fn query_events(
        &self,
        stream_id: &StreamId,
        range_start: Tick,
        range_end: Tick,
    ) -> CoreResult<EventQuery<'_>> {
        let stream = self
            .streams
            .get(stream_id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Stream, stream_id))?;
        Ok(EventQuery::new(stream, range_start, range_end))
    }

    pub fn subscribe(&mut self, topic: Topic<StreamId>, callback: Callback<StreamId>) -> SubscriptionId {
        self.notifier.subscribe(topic, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Insert only the events whose ids are absent. Replaying an "add" twice is a no-op.
    pub(crate) fn restore_events(&mut self, stream_id: &StreamId, events: &[Event]) -> CoreResult<()> {
        let stream = self.stream_mut(stream_id)?;
        let mut changed = false;
        for event in events {
            if !stream.contains(event.id()) {
                stream.insert_sorted(event.clone());
                changed = true;
            }
        }
        if changed {
            self.notifier.notify(stream_id.clone());
        }
        Ok(())
    }

    /// Overwrite present events with the given versions.
    pub(crate) fn overwrite_events(&mut self, stream_id: &StreamId, events: &[Event]) -> CoreResult<()> {
        let stream = self.stream_mut(stream_id)?;
        let mut changed = false;
        for event in events {
            if stream.event(event.id()) != Some(event) && stream.replace(event.clone()).is_some() {
                changed = true;
            }
        }
        if changed {
            self.notifier.notify(stream_id.clone());
        }
        Ok(())
    }

    pub(crate) fn hold(&mut self) {
        self.notifier.hold();
    }

    pub(crate) fn release(&mut self) {
        self.notifier.release();
    }

    pub(crate) fn clear(&mut self) {
        let ids = std::mem::take(&mut self.stream_order);
        self.streams.clear();
        self.stream_ids.reset();
        self.event_ids.reset();
        for id in ids {
            self.notifier.notify(id);
        }
    }

    fn stream_mut(&mut self, id: &StreamId) -> CoreResult<&mut EventStream> {
        self.streams
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Stream, id))
    }
}

fn non_finite(event: &Event) -> CoreError {
    CoreError::InvalidValue(format!("event {} has a non-finite automation value", event.id()))
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazy, restartable view over the events of one stream that overlap a range.
///
/// Holds a borrowed candidate window; each `iter()` call starts over.
#[derive(Debug, Clone, Copy)]
pub struct EventQuery<'a> {
    window: &'a [Event],
    range_start: Tick,
    range_end: Tick,
}

impl<'a> EventQuery<'a> {
    fn new(stream: &'a EventStream, range_start: Tick, range_end: Tick) -> Self {
        if range_end <= range_start {
            return Self {
                window: &[],
                range_start,
                range_end,
            };
        }
        let events = stream.events();
        let longest = stream.longest_duration();
        // Nothing starting before `range_start - longest` can still be sounding.
        let lo = events.partition_point(|e| e.start().saturating_add(longest) <= range_start);
        let hi = events.partition_point(|e| e.start() < range_end);
        let window = if lo < hi { &events[lo..hi] } else { &[] };
        Self {
            window,
            range_start,
            range_end,
        }
    }

    pub fn iter(&self) -> EventQueryIter<'a> {
        EventQueryIter {
            inner: self.window.iter(),
            range_start: self.range_start,
            range_end: self.range_end,
        }
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for EventQuery<'a> {
    type Item = &'a Event;
    type IntoIter = EventQueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct EventQueryIter<'a> {
    inner: std::slice::Iter<'a, Event>,
    range_start: Tick,
    range_end: Tick,
}

impl<'a> Iterator for EventQueryIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, end) = (self.range_start, self.range_end);
        self.inner.by_ref().find(|e| e.overlaps(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store_with_melody() -> (EventStore, StreamId) {
        let mut store = EventStore::new();
        let id = store.create_stream("melody");
        store
            .add_events(
                &id,
                vec![
                    Event::note("e1", 0, 480, 60, 100),
                    Event::note("e2", 480, 480, 62, 100),
                    Event::note("e3", 960, 1920, 64, 100),
                    Event::note("e4", 1440, 240, 67, 100),
                ],
            )
            .unwrap();
        (store, id)
    }

    fn ids(query: EventQuery<'_>) -> Vec<String> {
        query.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn create_and_get_stream() {
        let mut store = EventStore::new();
        let id = store.create_stream("drums");
        assert_eq!(store.get_stream(&id).unwrap().name, "drums");
        assert_eq!(store.stream_ids(), &[id]);
    }

    #[test]
    fn add_events_rejects_duplicates_atomically() {
        let (mut store, id) = store_with_melody();
        let err = store
            .add_events(
                &id,
                vec![Event::note("new", 0, 10, 60, 1), Event::note("e2", 0, 10, 60, 1)],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { entity: EntityKind::Event, .. }));
        assert_eq!(store.get_stream(&id).unwrap().len(), 4);

        let err = store
            .add_events(
                &id,
                vec![Event::note("x", 0, 10, 60, 1), Event::note("x", 5, 10, 60, 1)],
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
    }

    #[test]
    fn non_finite_automation_is_refused() {
        let mut store = EventStore::new();
        let id = store.create_stream("filter");
        let err = store
            .add_events(&id, vec![Event::automation("a1", 0, 10, f32::NAN)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue(_)));
        assert!(store.get_stream(&id).unwrap().is_empty());

        store
            .add_events(&id, vec![Event::automation("a1", 0, 10, 0.5)])
            .unwrap();
        let patch = EventPatch {
            payload: Some(cadenza_types::EventPayload::Automation { value: f32::INFINITY }),
            ..Default::default()
        };
        let err = store.update_event(&id, &EventId::new("a1"), &patch).unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue(_)));
        assert_eq!(
            store.get_stream(&id).unwrap().events()[0].payload(),
            &cadenza_types::EventPayload::Automation { value: 0.5 }
        );
    }

    #[test]
    fn inserted_stream_with_repeated_ids_is_refused() {
        let mut store = EventStore::new();
        let mut stream = EventStream::new(StreamId::new("lead"), "lead");
        stream.insert_sorted(Event::note("e1", 0, 10, 60, 100));
        stream.insert_sorted(Event::note("e1", 20, 10, 62, 100));
        let err = store.insert_stream(stream).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { entity: EntityKind::Event, ref id } if id == "e1"));
        assert!(store.is_empty());
    }

    #[test]
    fn insert_at_restores_creation_position() {
        let mut store = EventStore::new();
        let a = store.create_stream("a");
        let b = store.create_stream("b");
        let c = store.create_stream("c");
        let at = store.stream_position(&b).unwrap();
        let removed = store.destroy_stream(&b).unwrap();
        store.insert_stream_at(removed, at).unwrap();
        assert_eq!(store.stream_ids(), &[a, b, c]);
    }

    #[test]
    fn unknown_stream_is_not_found() {
        let mut store = EventStore::new();
        let missing = StreamId::new("nope");
        assert!(matches!(
            store.add_events(&missing, vec![]),
            Err(CoreError::NotFound { entity: EntityKind::Stream, .. })
        ));
        assert!(store.remove_events(&missing, &[]).is_err());
        assert!(store.query_events(&missing, 0, 10).is_err());
    }

    #[test]
    fn remove_ignores_unknown_ids() {
        let (mut store, id) = store_with_melody();
        let diff = store.remove_events(&id, &[EventId::new("ghost")]).unwrap();
        assert!(diff.is_empty());

        let diff = store
            .remove_events(&id, &[EventId::new("e1"), EventId::new("ghost")])
            .unwrap();
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(store.get_stream(&id).unwrap().len(), 3);
    }

    #[test]
    fn query_uses_half_open_overlap() {
        let (store, id) = store_with_melody();
        // e3 (960..2880) still sounds at 2000; e4 ends at 1680.
        assert_eq!(ids(store.query_events(&id, 2000, 2100).unwrap()), vec!["e3"]);
        // e1 ends exactly at 480: excluded.
        assert_eq!(ids(store.query_events(&id, 480, 481).unwrap()), vec!["e2"]);
        assert_eq!(
            ids(store.query_events(&id, 0, 1441).unwrap()),
            vec!["e1", "e2", "e3", "e4"]
        );
        assert!(store.query_events(&id, 3000, 4000).unwrap().is_empty());
        assert!(store.query_events(&id, 500, 500).unwrap().is_empty());
        assert!(store.query_events(&id, 900, 100).unwrap().is_empty());
    }

    #[test]
    fn query_is_restartable() {
        let (store, id) = store_with_melody();
        let query = store.query_events(&id, 0, 1000).unwrap();
        let first: Vec<_> = query.iter().collect();
        let second: Vec<_> = query.iter().collect();
        assert_eq!(first, second);
        assert_eq!(query.count(), 3);
    }

    #[test]
    fn update_moves_and_reorders() {
        let (mut store, id) = store_with_melody();
        let diff = store
            .update_event(&id, &EventId::new("e1"), &EventPatch::move_to(3000))
            .unwrap();
        assert_eq!(diff.updated.len(), 1);
        let stream = store.get_stream(&id).unwrap();
        assert_eq!(stream.events().last().unwrap().id().as_str(), "e1");

        let err = store
            .update_event(&id, &EventId::new("ghost"), &EventPatch::move_to(0))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: EntityKind::Event, .. }));
    }

    #[test]
    fn subscribers_hear_about_their_stream() {
        let (mut store, id) = store_with_melody();
        let other = store.create_stream("bass");
        let hits = Rc::new(RefCell::new(0));
        let sink = hits.clone();
        let sub = store.subscribe(Topic::Key(id.clone()), Box::new(move |_: &StreamId| *sink.borrow_mut() += 1));

        store.add_events(&other, vec![Event::note("b1", 0, 10, 40, 1)]).unwrap();
        assert_eq!(*hits.borrow(), 0);
        store.remove_events(&id, &[EventId::new("e1")]).unwrap();
        assert_eq!(*hits.borrow(), 1);
        // No-op removal does not notify.
        store.remove_events(&id, &[EventId::new("e1")]).unwrap();
        assert_eq!(*hits.borrow(), 1);

        assert!(store.unsubscribe(sub));
        store.remove_events(&id, &[EventId::new("e2")]).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn next_event_id_skips_used_ids() {
        let mut store = EventStore::new();
        let id = store.create_stream("s");
        store
            .add_events(&id, vec![Event::note("event-1", 0, 1, 60, 1)])
            .unwrap();
        assert_eq!(store.next_event_id().as_str(), "event-2");
    }

    #[test]
    fn destroy_stream_returns_contents() {
        let (mut store, id) = store_with_melody();
        let stream = store.destroy_stream(&id).unwrap();
        assert_eq!(stream.len(), 4);
        assert!(store.get_stream(&id).is_none());
        assert!(store.stream_ids().is_empty());
        assert!(store.destroy_stream(&id).is_err());
    }
}

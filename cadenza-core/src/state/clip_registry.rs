//! Clips are references: a stream id plus playback metadata. Reading a clip's
//! material always goes back to the event store.

use std::collections::HashMap;

use cadenza_types::{
    Clip, ClipId, ClipMeta, ClipPatch, CoreError, CoreResult, EntityKind, IdAllocator, StreamId,
    Tick,
};

use super::event_store::{EventQuery, EventStore};
use super::notify::{Callback, Notifier, SubscriptionId, Topic};

pub struct ClipRegistry {
    clips: HashMap<ClipId, Clip>,
    order: Vec<ClipId>,
    ids: IdAllocator,
    notifier: Notifier<ClipId>,
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            order: Vec::new(),
            ids: IdAllocator::new("clip"),
            notifier: Notifier::new(),
        }
    }

    pub fn create_clip(
        &mut self,
        streams: &EventStore,
        stream_id: &StreamId,
        meta: ClipMeta,
    ) -> CoreResult<ClipId> {
        if !streams.contains(stream_id) {
            return Err(CoreError::not_found(EntityKind::Stream, stream_id));
        }
        let id = loop {
            let candidate = ClipId::new(self.ids.next_raw());
            if !self.clips.contains_key(&candidate) {
                break candidate;
            }
        };
        let clip = Clip {
            id: id.clone(),
            stream_id: stream_id.clone(),
            duration: meta.duration,
            looping: meta.looping,
            color: meta.color,
            name: meta.name,
            track_id: meta.track_id,
        };
        log::debug!(target: "clips", "created clip {} -> {}", id, stream_id);
        self.clips.insert(id.clone(), clip);
        self.order.push(id.clone());
        self.notifier.notify(id.clone());
        Ok(id)
    }

    /// Put back a complete clip record (snapshot restore, undo of a delete).
    pub fn insert_clip(&mut self, streams: &EventStore, clip: Clip) -> CoreResult<()> {
        if !streams.contains(&clip.stream_id) {
            return Err(CoreError::not_found(EntityKind::Stream, &clip.stream_id));
        }
        if self.clips.contains_key(&clip.id) {
            return Err(CoreError::duplicate(EntityKind::Clip, &clip.id));
        }
        self.ids.observe(clip.id.as_str());
        let id = clip.id.clone();
        self.clips.insert(id.clone(), clip);
        self.order.push(id.clone());
        self.notifier.notify(id);
        Ok(())
    }

    /// Returns `(before, after)`. Retargeting to another stream is checked
    /// against the event store.
    pub fn update_clip(
        &mut self,
        streams: &EventStore,
        id: &ClipId,
        patch: &ClipPatch,
    ) -> CoreResult<(Clip, Clip)> {
        if let Some(stream_id) = &patch.stream_id {
            if !streams.contains(stream_id) {
                return Err(CoreError::not_found(EntityKind::Stream, stream_id));
            }
        }
        let clip = self
            .clips
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Clip, id))?;
        let before = clip.clone();
        let after = patch.apply_to(&before);
        if after != before {
            *clip = after.clone();
            self.notifier.notify(id.clone());
        }
        Ok((before, after))
    }

    /// Remove the clip record only; the stream is untouched.
    pub fn delete_clip(&mut self, id: &ClipId) -> CoreResult<Clip> {
        let clip = self
            .clips
            .remove(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Clip, id))?;
        self.order.retain(|c| c != id);
        log::debug!(target: "clips", "deleted clip {}", id);
        self.notifier.notify(id.clone());
        Ok(clip)
    }

    pub fn get_clip(&self, id: &ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn list_clips_for_stream(&self, stream_id: &StreamId) -> Vec<&Clip> {
        self.clips().filter(|c| &c.stream_id == stream_id).collect()
    }

    /// Clip ids in creation order.
    pub fn clip_ids(&self) -> &[ClipId] {
        &self.order
    }

    /// Index of the clip in creation order.
    pub fn clip_position(&self, id: &ClipId) -> Option<usize> {
        self.order.iter().position(|c| c == id)
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.order.iter().filter_map(|id| self.clips.get(id))
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// The clip's material in clip-relative `[range_start, range_end)`, read
    /// from its stream now. The range is clamped to the clip duration.
    pub fn clip_events<'a>(
        &self,
        streams: &'a EventStore,
        id: &ClipId,
        range_start: Tick,
        range_end: Tick,
    ) -> CoreResult<EventQuery<'a>> {
        let clip = self
            .clips
            .get(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Clip, id))?;
        streams.query_events(&clip.stream_id, range_start, range_end.min(clip.duration))
    }

    pub fn subscribe(&mut self, topic: Topic<ClipId>, callback: Callback<ClipId>) -> SubscriptionId {
        self.notifier.subscribe(topic, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Insert or overwrite without stream validation; used when replaying
    /// history, where the stream was restored earlier in the same entry. A
    /// newly inserted clip goes to `at` in creation order, or last.
    pub(crate) fn put_clip(&mut self, clip: Clip, at: Option<usize>) {
        let id = clip.id.clone();
        if self.clips.get(&id) == Some(&clip) {
            return;
        }
        if self.clips.insert(id.clone(), clip).is_none() {
            let end = self.order.len();
            self.order.insert(at.map_or(end, |i| i.min(end)), id.clone());
        }
        self.notifier.notify(id);
    }

    pub(crate) fn remove_if_present(&mut self, id: &ClipId) {
        if self.clips.remove(id).is_some() {
            self.order.retain(|c| c != id);
            self.notifier.notify(id.clone());
        }
    }

    pub(crate) fn hold(&mut self) {
        self.notifier.hold();
    }

    pub(crate) fn release(&mut self) {
        self.notifier.release();
    }

    pub(crate) fn clear(&mut self) {
        let ids = std::mem::take(&mut self.order);
        self.clips.clear();
        self.ids.reset();
        for id in ids {
            self.notifier.notify(id);
        }
    }
}

impl Default for ClipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Clips: named, placeable references to a stream.

use serde::{Deserialize, Serialize};

use crate::{ClipId, StreamId, Tick, TrackId};

/// RGB clip color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipColor(pub u8, pub u8, pub u8);

impl Default for ClipColor {
    fn default() -> Self {
        ClipColor(0x5a, 0x8d, 0xd6)
    }
}

/// A clip points at a stream plus playback metadata. It never holds events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub stream_id: StreamId,
    pub duration: Tick,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub color: ClipColor,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
}

/// Fields supplied when creating a clip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipMeta {
    pub name: String,
    pub duration: Tick,
    pub looping: bool,
    pub color: ClipColor,
    pub track_id: Option<TrackId>,
}

impl ClipMeta {
    pub fn new(name: impl Into<String>, duration: Tick) -> Self {
        Self {
            name: name.into(),
            duration,
            ..Default::default()
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn color(mut self, color: ClipColor) -> Self {
        self.color = color;
        self
    }

    pub fn on_track(mut self, track: TrackId) -> Self {
        self.track_id = Some(track);
        self
    }
}

/// Partial clip update. `track_id: Some(None)` detaches the clip from its track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipPatch {
    pub stream_id: Option<StreamId>,
    pub duration: Option<Tick>,
    pub looping: Option<bool>,
    pub color: Option<ClipColor>,
    pub name: Option<String>,
    pub track_id: Option<Option<TrackId>>,
}

impl ClipPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, clip: &Clip) -> Clip {
        let mut next = clip.clone();
        if let Some(stream_id) = &self.stream_id {
            next.stream_id = stream_id.clone();
        }
        if let Some(duration) = self.duration {
            next.duration = duration;
        }
        if let Some(looping) = self.looping {
            next.looping = looping;
        }
        if let Some(color) = self.color {
            next.color = color;
        }
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(track_id) = &self.track_id {
            next.track_id = track_id.clone();
        }
        next
    }
}

//! View-facing pointers and transport state shared by every editing surface.
//!
//! Nothing here is musical content: the active context is never part of a
//! project snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClipId, EventId, StreamId, Tick, TrackId, WorkspaceId};

/// The editing surfaces that observe the shared stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    StepGrid,
    Notation,
    PianoRoll,
    ClipLauncher,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::StepGrid,
        ViewKind::Notation,
        ViewKind::PianoRoll,
        ViewKind::ClipLauncher,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ViewKind::StepGrid => "step_grid",
            ViewKind::Notation => "notation",
            ViewKind::PianoRoll => "piano_roll",
            ViewKind::ClipLauncher => "clip_launcher",
        }
    }
}

impl Default for ViewKind {
    fn default() -> Self {
        Self::PianoRoll
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: Tick,
    pub end: Tick,
}

impl LoopRegion {
    pub fn new(start: Tick, end: Tick) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> Tick {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transport {
    pub tempo: f64,
    pub time_sig_num: u8,
    pub time_sig_den: u8,
    pub loop_region: Option<LoopRegion>,
    pub playhead_tick: Tick,
    pub playing: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            time_sig_num: 4,
            time_sig_den: 4,
            loop_region: None,
            playhead_tick: 0,
            playing: false,
        }
    }
}

/// What the user has picked across views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub events: Vec<(StreamId, EventId)>,
    pub clips: Vec<ClipId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.clips.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.clips.clear();
    }
}

/// Deck-local UI state (panel sizes, scroll, zoom). Reset by a workspace
/// switch only when asked.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutState {
    pub panel_sizes: BTreeMap<String, f32>,
    pub scroll_tick: Tick,
    pub zoom: f32,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self {
            panel_sizes: BTreeMap::new(),
            scroll_tick: 0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveContext {
    pub active_stream_id: Option<StreamId>,
    pub active_clip_id: Option<ClipId>,
    pub active_track_id: Option<TrackId>,
    pub active_view_kind: ViewKind,
    pub active_workspace: Option<WorkspaceId>,
    pub visible_views: Vec<ViewKind>,
    pub selection: Selection,
    pub layout: LayoutState,
    pub transport: Transport,
}

/// A named configuration of visible views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDescriptor {
    pub id: WorkspaceId,
    pub name: String,
    pub views: Vec<ViewKind>,
    /// Fallback for views the workspace does not show.
    #[serde(default)]
    pub primary_view: Option<ViewKind>,
}

impl WorkspaceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, views: Vec<ViewKind>) -> Self {
        let primary_view = views.first().copied();
        Self {
            id: WorkspaceId::new(id),
            name: name.into(),
            views,
            primary_view,
        }
    }

    pub fn with_primary(mut self, view: ViewKind) -> Self {
        self.primary_view = Some(view);
        self
    }

    pub fn shows(&self, view: ViewKind) -> bool {
        self.views.contains(&view)
    }
}

/// Workspace switch options. The default preserves everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchOptions {
    pub reset_layout: bool,
    /// Clear the active stream, clip and track.
    pub clear_active: bool,
    pub clear_selection: bool,
    pub stop_transport: bool,
}

/// Where a view that was on screen ends up after a switch. `to: None` means it
/// is simply not shown; its data is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewMigration {
    pub from: ViewKind,
    pub to: Option<ViewKind>,
}

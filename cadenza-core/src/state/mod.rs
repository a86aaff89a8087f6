pub mod clip_registry;
pub mod context;
pub mod edit;
pub mod event_store;
pub mod notify;
pub mod persistence;
pub mod prefs;
pub mod routing_graph;
pub mod undo;

pub use clip_registry::ClipRegistry;
pub use context::{ContextChange, ContextCoordinator, HookError, SwitchReport, WorkspaceHooks};
pub use edit::EditOp;
pub use event_store::{EventQuery, EventStore};
pub use notify::{Callback, SubscriptionId, Topic};
pub use prefs::PreferenceStore;
pub use routing_graph::RoutingGraph;
pub use undo::{ApplyCommand, UndoEntry, UndoStack};

use std::path::Path;

use crossbeam_channel::Receiver;

use cadenza_types::{
    Clip, ClipId, ClipMeta, ClipPatch, ConnectionId, ConnectionRequest, CoreError, CoreResult,
    EntityKind, Event, EventDiff, EventId, EventPatch, EventStream, NodeId, NodeRemoval, PortType,
    ProjectSnapshot, RoutingConnection, RoutingDelta, RoutingNode, RoutingSnapshot, StreamId,
    TrackId, SNAPSHOT_VERSION,
};

use crate::config::Config;
use edit::{event_diff_ops, node_removal_ops, OpPair};

/// The three content stores. This is what undo history replays against.
#[derive(Default)]
pub struct Stores {
    pub events: EventStore,
    pub clips: ClipRegistry,
    pub routing: RoutingGraph,
}

/// What to do with clips that still point at a stream being destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamRemoval {
    /// Refuse with `StreamInUse`.
    #[default]
    Reject,
    /// Delete the referencing clips in the same undo step.
    Cascade,
}

/// One open project: every store, the undo history and the active context.
///
/// All content mutations go through here so each one lands in history as a
/// forward/inverse pair.
pub struct Project {
    stores: Stores,
    history: UndoStack<EditOp>,
    context: ContextCoordinator,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        Self::with_config(&Config::embedded())
    }

    pub fn with_config(config: &Config) -> Self {
        let mut stores = Stores::default();
        stores
            .routing
            .set_allow_modulation_feedback(config.allow_modulation_feedback());
        Self {
            stores,
            history: UndoStack::new(config.max_undo_entries()),
            context: ContextCoordinator::new(config.transport()),
        }
    }

    pub fn events(&self) -> &EventStore {
        &self.stores.events
    }

    pub fn clips(&self) -> &ClipRegistry {
        &self.stores.clips
    }

    pub fn routing(&self) -> &RoutingGraph {
        &self.stores.routing
    }

    pub fn context(&self) -> &ContextCoordinator {
        &self.context
    }

    /// Context changes are not undoable, so the coordinator is handed out
    /// directly. Pointers at content (active stream and clip) are only set
    /// through `Project`, which checks they exist.
    pub fn context_mut(&mut self) -> &mut ContextCoordinator {
        &mut self.context
    }

    pub fn history(&self) -> &UndoStack<EditOp> {
        &self.history
    }

    // Subscriptions

    pub fn subscribe_streams(&mut self, topic: Topic<StreamId>, callback: Callback<StreamId>) -> SubscriptionId {
        self.stores.events.subscribe(topic, callback)
    }

    pub fn unsubscribe_streams(&mut self, id: SubscriptionId) -> bool {
        self.stores.events.unsubscribe(id)
    }

    pub fn subscribe_clips(&mut self, topic: Topic<ClipId>, callback: Callback<ClipId>) -> SubscriptionId {
        self.stores.clips.subscribe(topic, callback)
    }

    pub fn unsubscribe_clips(&mut self, id: SubscriptionId) -> bool {
        self.stores.clips.unsubscribe(id)
    }

    pub fn subscribe_routing(&mut self, topic: Topic<NodeId>, callback: Callback<NodeId>) -> SubscriptionId {
        self.stores.routing.subscribe(topic, callback)
    }

    pub fn unsubscribe_routing(&mut self, id: SubscriptionId) -> bool {
        self.stores.routing.unsubscribe(id)
    }

    pub fn subscribe_context(
        &mut self,
        topic: Topic<ContextChange>,
        callback: Callback<ContextChange>,
    ) -> SubscriptionId {
        self.context.subscribe(topic, callback)
    }

    pub fn unsubscribe_context(&mut self, id: SubscriptionId) -> bool {
        self.context.unsubscribe(id)
    }

    pub fn subscribe_deltas(&mut self) -> Receiver<RoutingDelta> {
        self.stores.routing.subscribe_deltas()
    }

    // Groups and history

    /// Open an undo group. Store notifications are held until the matching
    /// outermost `end_group`.
    pub fn begin_group(&mut self, description: impl Into<String>) {
        self.history.begin_group(description);
        self.hold_all();
    }

    pub fn end_group(&mut self) {
        if !self.history.is_grouping() {
            log::warn!(target: "undo", "end_group without begin_group");
            return;
        }
        self.history.end_group();
        self.release_all();
    }

    /// Revert the newest history entry. Returns its description.
    pub fn undo(&mut self) -> CoreResult<Option<String>> {
        self.hold_all();
        let result = self.history.undo(&mut self.stores);
        self.sync_context();
        self.release_all();
        result
    }

    pub fn redo(&mut self) -> CoreResult<Option<String>> {
        self.hold_all();
        let result = self.history.redo(&mut self.stores);
        self.sync_context();
        self.release_all();
        result
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // Streams and events

    pub fn create_stream(&mut self, name: impl Into<String>) -> StreamId {
        let id = self.stores.events.create_stream(name);
        if let Some(stream) = self.stores.events.get_stream(&id) {
            let redo = vec![EditOp::InsertStream {
                stream: stream.clone(),
                at: self.stores.events.stream_position(&id),
            }];
            let undo = vec![EditOp::RemoveStream(id.clone())];
            self.record("Create stream", (redo, undo));
        }
        id
    }

    /// Destroy a stream. Clips that still reference it either block the
    /// call or go with it, depending on `removal`.
    pub fn destroy_stream(&mut self, id: &StreamId, removal: StreamRemoval) -> CoreResult<EventStream> {
        if !self.stores.events.contains(id) {
            return Err(CoreError::not_found(EntityKind::Stream, id));
        }
        let referencing: Vec<ClipId> = self
            .stores
            .clips
            .list_clips_for_stream(id)
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        if !referencing.is_empty() && removal == StreamRemoval::Reject {
            return Err(CoreError::StreamInUse {
                stream: id.to_string(),
                clips: referencing.iter().map(|c| c.to_string()).collect(),
            });
        }

        self.hold_all();
        let result = self.destroy_stream_with_clips(id, &referencing);
        self.release_all();
        result
    }

    fn destroy_stream_with_clips(&mut self, id: &StreamId, clips: &[ClipId]) -> CoreResult<EventStream> {
        // positions ascend, so re-inserting in this order restores them exactly
        let clip_at: Vec<Option<usize>> = clips
            .iter()
            .map(|c| self.stores.clips.clip_position(c))
            .collect();
        let stream_at = self.stores.events.stream_position(id);
        let mut removed_clips = Vec::with_capacity(clips.len());
        for clip_id in clips {
            removed_clips.push(self.stores.clips.delete_clip(clip_id)?);
            self.context.forget_clip(clip_id);
        }
        let stream = self.stores.events.destroy_stream(id)?;
        self.context.forget_stream(id);

        let mut redo: Vec<EditOp> = clips.iter().map(|c| EditOp::RemoveClip(c.clone())).collect();
        redo.push(EditOp::RemoveStream(id.clone()));
        let mut undo = vec![EditOp::InsertStream {
            stream: stream.clone(),
            at: stream_at,
        }];
        undo.extend(
            removed_clips
                .into_iter()
                .zip(clip_at)
                .map(|(clip, at)| EditOp::PutClip { clip, at }),
        );
        self.record("Destroy stream", (redo, undo));
        Ok(stream)
    }

    pub fn next_event_id(&mut self) -> EventId {
        self.stores.events.next_event_id()
    }

    pub fn add_events(&mut self, stream: &StreamId, events: Vec<Event>) -> CoreResult<EventDiff> {
        let diff = self.stores.events.add_events(stream, events)?;
        self.record("Add events", event_diff_ops(&diff));
        Ok(diff)
    }

    /// Unknown ids are ignored; an empty diff records nothing.
    pub fn remove_events(&mut self, stream: &StreamId, ids: &[EventId]) -> CoreResult<EventDiff> {
        let diff = self.stores.events.remove_events(stream, ids)?;
        if !diff.removed.is_empty() {
            let selection = &self.context.context().selection;
            if selection.events.iter().any(|(s, e)| s == stream && ids.contains(e)) {
                let mut next = selection.clone();
                next.events.retain(|(s, e)| !(s == stream && ids.contains(e)));
                self.context.set_selection(next);
            }
        }
        self.record("Remove events", event_diff_ops(&diff));
        Ok(diff)
    }

    pub fn update_event(&mut self, stream: &StreamId, id: &EventId, patch: &EventPatch) -> CoreResult<EventDiff> {
        let diff = self.stores.events.update_event(stream, id, patch)?;
        self.record("Edit event", event_diff_ops(&diff));
        Ok(diff)
    }

    // Clips

    pub fn create_clip(&mut self, stream: &StreamId, meta: ClipMeta) -> CoreResult<ClipId> {
        let id = self.stores.clips.create_clip(&self.stores.events, stream, meta)?;
        if let Some(clip) = self.stores.clips.get_clip(&id) {
            let redo = vec![EditOp::PutClip {
                clip: clip.clone(),
                at: self.stores.clips.clip_position(&id),
            }];
            let undo = vec![EditOp::RemoveClip(id.clone())];
            self.record("Create clip", (redo, undo));
        }
        Ok(id)
    }

    pub fn update_clip(&mut self, id: &ClipId, patch: &ClipPatch) -> CoreResult<Clip> {
        let (before, after) = self.stores.clips.update_clip(&self.stores.events, id, patch)?;
        if before != after {
            let redo = vec![EditOp::PutClip {
                clip: after.clone(),
                at: None,
            }];
            let undo = vec![EditOp::PutClip { clip: before, at: None }];
            self.record("Edit clip", (redo, undo));
        }
        Ok(after)
    }

    pub fn delete_clip(&mut self, id: &ClipId) -> CoreResult<Clip> {
        let at = self.stores.clips.clip_position(id);
        let clip = self.stores.clips.delete_clip(id)?;
        self.context.forget_clip(id);
        let redo = vec![EditOp::RemoveClip(id.clone())];
        let undo = vec![EditOp::PutClip {
            clip: clip.clone(),
            at,
        }];
        self.record("Delete clip", (redo, undo));
        Ok(clip)
    }

    // Routing

    pub fn add_node(&mut self, node: RoutingNode) -> CoreResult<NodeId> {
        let record = node.clone();
        let id = self.stores.routing.add_node(node)?;
        let redo = vec![EditOp::InsertNode {
            node: record,
            at: self.stores.routing.node_position(&id),
        }];
        let undo = vec![EditOp::RemoveNode(id.clone())];
        self.record("Add node", (redo, undo));
        Ok(id)
    }

    /// Removes the node and its connections as one undo step.
    pub fn remove_node(&mut self, id: &NodeId) -> CoreResult<NodeRemoval> {
        let routing = &self.stores.routing;
        let node_at = routing.node_position(id);
        let connections_at: Vec<Option<usize>> = routing
            .connections_for_node(id)
            .iter()
            .map(|c| routing.connection_position(&c.id))
            .collect();
        self.hold_all();
        let result = self.stores.routing.remove_node(id);
        self.release_all();
        let removal = result?;
        self.record("Remove node", node_removal_ops(&removal, node_at, &connections_at));
        Ok(removal)
    }

    pub fn add_connection(&mut self, request: ConnectionRequest) -> CoreResult<ConnectionId> {
        let id = self.stores.routing.add_connection(request)?;
        if let Some(conn) = self.stores.routing.connection(&id) {
            let redo = vec![EditOp::InsertConnection {
                conn: conn.clone(),
                at: self.stores.routing.connection_position(&id),
            }];
            let undo = vec![EditOp::RemoveConnection(id.clone())];
            self.record("Connect", (redo, undo));
        }
        Ok(id)
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> CoreResult<RoutingConnection> {
        let at = self.stores.routing.connection_position(id);
        let conn = self.stores.routing.remove_connection(id)?;
        let redo = vec![EditOp::RemoveConnection(id.clone())];
        let undo = vec![EditOp::InsertConnection {
            conn: conn.clone(),
            at,
        }];
        self.record("Disconnect", (redo, undo));
        Ok(conn)
    }

    pub fn set_connection_gain(&mut self, id: &ConnectionId, gain: Option<f32>) -> CoreResult<()> {
        let enabled = self
            .stores
            .routing
            .connection(id)
            .map(|c| c.enabled)
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, id))?;
        let previous = self.stores.routing.set_connection_gain(id, gain)?;
        if previous != gain {
            let redo = vec![EditOp::SetConnection { id: id.clone(), gain, enabled }];
            let undo = vec![EditOp::SetConnection { id: id.clone(), gain: previous, enabled }];
            self.record("Set gain", (redo, undo));
        }
        Ok(())
    }

    pub fn set_connection_enabled(&mut self, id: &ConnectionId, enabled: bool) -> CoreResult<()> {
        let gain = self
            .stores
            .routing
            .connection(id)
            .map(|c| c.gain)
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, id))?;
        let previous = self.stores.routing.set_connection_enabled(id, enabled)?;
        if previous != enabled {
            let redo = vec![EditOp::SetConnection { id: id.clone(), gain, enabled }];
            let undo = vec![EditOp::SetConnection { id: id.clone(), gain, enabled: previous }];
            self.record(if enabled { "Enable connection" } else { "Disable connection" }, (redo, undo));
        }
        Ok(())
    }

    // Active context

    /// Point the views at a stream. The stream must exist.
    pub fn set_active_stream(&mut self, id: Option<StreamId>) -> CoreResult<()> {
        if let Some(id) = &id {
            if !self.stores.events.contains(id) {
                return Err(CoreError::not_found(EntityKind::Stream, id));
            }
        }
        self.context.set_active_stream(id);
        Ok(())
    }

    /// Point the views at a clip; its stream becomes the active stream.
    pub fn set_active_clip(&mut self, id: Option<ClipId>) -> CoreResult<()> {
        let Some(id) = id else {
            self.context.set_active_clip(None);
            return Ok(());
        };
        let stream = self
            .stores
            .clips
            .get_clip(&id)
            .map(|c| c.stream_id.clone())
            .ok_or_else(|| CoreError::not_found(EntityKind::Clip, &id))?;
        self.context.hold();
        self.context.set_active_clip(Some(id));
        self.context.set_active_stream(Some(stream));
        self.context.release();
        Ok(())
    }

    /// Tracks live outside the core, so any id is accepted.
    pub fn set_active_track(&mut self, id: Option<TrackId>) {
        self.context.set_active_track(id);
    }

    // Snapshots

    /// Capture all musical content in creation order. The active context is
    /// not part of it.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            version: SNAPSHOT_VERSION,
            streams: self.stores.events.streams().cloned().collect(),
            clips: self.stores.clips.clips().cloned().collect(),
            routing: RoutingSnapshot {
                nodes: self.stores.routing.nodes().cloned().collect(),
                connections: self.stores.routing.connections().cloned().collect(),
            },
        }
    }

    /// Replace all content with `snapshot`. The snapshot is validated in full
    /// first; on error nothing changes. History is cleared.
    pub fn restore(&mut self, snapshot: &ProjectSnapshot) -> CoreResult<()> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        let mut scratch = Stores::default();
        scratch
            .routing
            .set_allow_modulation_feedback(self.stores.routing.allows_modulation_feedback());
        load_into(&mut scratch, snapshot)?;

        self.hold_all();
        self.stores.clips.clear();
        self.stores.routing.clear();
        self.stores.events.clear();
        let result = load_into(&mut self.stores, snapshot);
        self.history.clear();
        self.sync_context();
        self.release_all();
        log::info!(
            target: "persistence",
            "restored {} streams, {} clips, {} nodes, {} connections",
            snapshot.streams.len(),
            snapshot.clips.len(),
            snapshot.routing.nodes.len(),
            snapshot.routing.connections.len()
        );
        result
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        persistence::save_project(path, &self.snapshot())
    }

    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        let snapshot = persistence::load_project(path)?;
        let mut project = Self::with_config(config);
        project.restore(&snapshot)?;
        Ok(project)
    }

    /// Structural problems, one line each. Empty when the project is consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let events = &self.stores.events;
        let routing = &self.stores.routing;

        for stream in events.streams() {
            if stream.events().windows(2).any(|w| w[0].start() > w[1].start()) {
                problems.push(format!("stream {} is not ordered by start", stream.id));
            }
        }
        for clip in self.stores.clips.clips() {
            if !events.contains(&clip.stream_id) {
                problems.push(format!("clip {} points at missing stream {}", clip.id, clip.stream_id));
            }
        }
        for conn in routing.connections() {
            let source = routing.node(&conn.source_node).and_then(|n| n.port(&conn.source_port));
            let target = routing.node(&conn.target_node).and_then(|n| n.port(&conn.target_port));
            if source.is_none() || target.is_none() {
                problems.push(format!("connection {} has a dangling endpoint", conn.id));
            }
        }
        for port_type in [PortType::Audio, PortType::Midi, PortType::Trigger, PortType::Modulation] {
            let allowed = port_type == PortType::Modulation && routing.allows_modulation_feedback();
            if !allowed && routing.has_cycle(port_type) {
                problems.push(format!("{} connections form a cycle", port_type));
            }
        }
        let ctx = self.context.context();
        if let Some(id) = &ctx.active_stream_id {
            if !events.contains(id) {
                problems.push(format!("active stream {} does not exist", id));
            }
        }
        if let Some(id) = &ctx.active_clip_id {
            if self.stores.clips.get_clip(id).is_none() {
                problems.push(format!("active clip {} does not exist", id));
            }
        }
        problems
    }

    fn record(&mut self, description: &str, (redo, undo): OpPair) {
        if redo.is_empty() && undo.is_empty() {
            return;
        }
        self.history.record(description, redo, undo);
    }

    /// Clear context pointers whose target went away (after undo, redo, restore).
    fn sync_context(&mut self) {
        let ctx = self.context.context();
        let stale_streams: Vec<StreamId> = ctx
            .active_stream_id
            .iter()
            .chain(ctx.selection.events.iter().map(|(s, _)| s))
            .filter(|s| !self.stores.events.contains(s))
            .cloned()
            .collect();
        let stale_clips: Vec<ClipId> = ctx
            .active_clip_id
            .iter()
            .chain(ctx.selection.clips.iter())
            .filter(|c| self.stores.clips.get_clip(c).is_none())
            .cloned()
            .collect();
        for id in &stale_streams {
            self.context.forget_stream(id);
        }
        for id in &stale_clips {
            self.context.forget_clip(id);
        }
    }

    fn hold_all(&mut self) {
        self.stores.events.hold();
        self.stores.clips.hold();
        self.stores.routing.hold();
        self.context.hold();
    }

    fn release_all(&mut self) {
        self.stores.events.release();
        self.stores.clips.release();
        self.stores.routing.release();
        self.context.release();
    }
}

/// Insert snapshot content in dependency order: streams, clips, nodes, connections.
fn load_into(stores: &mut Stores, snapshot: &ProjectSnapshot) -> CoreResult<()> {
    for stream in &snapshot.streams {
        stores.events.insert_stream(stream.clone())?;
    }
    for clip in &snapshot.clips {
        stores.clips.insert_clip(&stores.events, clip.clone())?;
    }
    for node in &snapshot.routing.nodes {
        stores.routing.add_node(node.clone())?;
    }
    for conn in &snapshot.routing.connections {
        stores.routing.insert_connection(conn.clone())?;
    }
    Ok(())
}

//! The active context: which stream, clip and view the user is looking at,
//! plus transport. Owns the workspace switch protocol.

use std::collections::{BTreeSet, HashMap};

use cadenza_types::{
    ActiveContext, ClipId, CoreError, CoreResult, EntityKind, LayoutState, LoopRegion, Selection,
    StreamId, SwitchOptions, TrackId, Transport, ViewKind, ViewMigration, WorkspaceDescriptor,
    WorkspaceId,
};

use super::notify::{Callback, Notifier, SubscriptionId, Topic};

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Per-workspace lifecycle callbacks. Failures are logged and never block a switch.
pub trait WorkspaceHooks {
    fn activate(&mut self, _workspace: &WorkspaceDescriptor, _context: &ActiveContext) -> Result<(), HookError> {
        Ok(())
    }

    fn deactivate(&mut self, _workspace: &WorkspaceDescriptor, _context: &ActiveContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Which part of the context changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextChange {
    ActiveStream,
    ActiveClip,
    ActiveTrack,
    View,
    Selection,
    Layout,
    Transport,
    Workspace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchReport {
    pub from: Option<WorkspaceId>,
    pub to: WorkspaceId,
    pub migrations: Vec<ViewMigration>,
}

pub struct ContextCoordinator {
    context: ActiveContext,
    workspaces: HashMap<WorkspaceId, WorkspaceDescriptor>,
    workspace_order: Vec<WorkspaceId>,
    view_factories: BTreeSet<ViewKind>,
    hooks: HashMap<WorkspaceId, Box<dyn WorkspaceHooks>>,
    notifier: Notifier<ContextChange>,
}

impl ContextCoordinator {
    pub fn new(transport: Transport) -> Self {
        Self {
            context: ActiveContext {
                transport,
                ..Default::default()
            },
            workspaces: HashMap::new(),
            workspace_order: Vec::new(),
            view_factories: BTreeSet::new(),
            hooks: HashMap::new(),
            notifier: Notifier::new(),
        }
    }

    pub fn context(&self) -> &ActiveContext {
        &self.context
    }

    pub fn transport(&self) -> &Transport {
        &self.context.transport
    }

    pub fn register_workspace(&mut self, workspace: WorkspaceDescriptor) -> CoreResult<()> {
        if self.workspaces.contains_key(&workspace.id) {
            return Err(CoreError::duplicate(EntityKind::Workspace, &workspace.id));
        }
        let id = workspace.id.clone();
        self.workspaces.insert(id.clone(), workspace);
        self.workspace_order.push(id);
        Ok(())
    }

    pub fn workspace(&self, id: &WorkspaceId) -> Option<&WorkspaceDescriptor> {
        self.workspaces.get(id)
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &WorkspaceDescriptor> {
        self.workspace_order
            .iter()
            .filter_map(|id| self.workspaces.get(id))
    }

    /// Returns false if a factory for `kind` was already registered.
    pub fn register_view_factory(&mut self, kind: ViewKind) -> bool {
        self.view_factories.insert(kind)
    }

    pub fn has_view_factory(&self, kind: ViewKind) -> bool {
        self.view_factories.contains(&kind)
    }

    pub fn set_hooks(&mut self, id: &WorkspaceId, hooks: Box<dyn WorkspaceHooks>) -> CoreResult<()> {
        if !self.workspaces.contains_key(id) {
            return Err(CoreError::not_found(EntityKind::Workspace, id));
        }
        self.hooks.insert(id.clone(), hooks);
        Ok(())
    }

    /// Make `target` the active workspace.
    ///
    /// Validation happens before anything changes. Hooks run around the
    /// option/migration step and subscribers hear about it exactly once.
    pub fn switch_workspace(&mut self, target: &WorkspaceId, options: SwitchOptions) -> CoreResult<SwitchReport> {
        let incoming = self
            .workspaces
            .get(target)
            .ok_or_else(|| CoreError::not_found(EntityKind::Workspace, target))?
            .clone();
        if let Some(missing) = incoming.views.iter().find(|v| !self.view_factories.contains(*v)) {
            return Err(CoreError::not_found(EntityKind::ViewFactory, missing.name()));
        }

        let from = self.context.active_workspace.clone();
        if let Some(outgoing) = from.as_ref().and_then(|id| self.workspaces.get(id)) {
            if let Some(hooks) = self.hooks.get_mut(&outgoing.id) {
                if let Err(e) = hooks.deactivate(outgoing, &self.context) {
                    log::warn!(target: "context", "deactivate hook for '{}' failed: {}", outgoing.id, e);
                }
            }
        }

        if options.reset_layout {
            self.context.layout = LayoutState::default();
        }
        if options.clear_active {
            self.context.active_stream_id = None;
            self.context.active_clip_id = None;
            self.context.active_track_id = None;
        }
        if options.clear_selection {
            self.context.selection.clear();
        }
        if options.stop_transport {
            self.context.transport.playing = false;
        }

        let migrations: Vec<ViewMigration> = self
            .context
            .visible_views
            .iter()
            .map(|&view| ViewMigration {
                from: view,
                to: migrate_view(&incoming, view),
            })
            .collect();
        // with no match and no primary view, fall back to the first view shown
        let active = migrate_view(&incoming, self.context.active_view_kind)
            .or_else(|| incoming.views.first().copied());
        if let Some(view) = active {
            self.context.active_view_kind = view;
        }
        self.context.visible_views = incoming.views.clone();
        self.context.active_workspace = Some(incoming.id.clone());

        if let Some(hooks) = self.hooks.get_mut(&incoming.id) {
            if let Err(e) = hooks.activate(&incoming, &self.context) {
                log::warn!(target: "context", "activate hook for '{}' failed: {}", incoming.id, e);
            }
        }

        log::info!(
            target: "context",
            "switched workspace {} -> {}",
            from.as_ref().map(|w| w.as_str()).unwrap_or("<none>"),
            incoming.id
        );
        self.notifier.notify(ContextChange::Workspace);
        Ok(SwitchReport {
            from,
            to: incoming.id,
            migrations,
        })
    }

    /// Unchecked; `Project::set_active_stream` validates against the event store.
    pub(crate) fn set_active_stream(&mut self, id: Option<StreamId>) {
        self.context.active_stream_id = id;
        self.notifier.notify(ContextChange::ActiveStream);
    }

    pub(crate) fn set_active_clip(&mut self, id: Option<ClipId>) {
        self.context.active_clip_id = id;
        self.notifier.notify(ContextChange::ActiveClip);
    }

    pub fn set_active_track(&mut self, id: Option<TrackId>) {
        self.context.active_track_id = id;
        self.notifier.notify(ContextChange::ActiveTrack);
    }

    pub fn set_active_view(&mut self, view: ViewKind) {
        self.context.active_view_kind = view;
        self.notifier.notify(ContextChange::View);
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.context.selection = selection;
        self.notifier.notify(ContextChange::Selection);
    }

    pub fn set_layout(&mut self, layout: LayoutState) {
        self.context.layout = layout;
        self.notifier.notify(ContextChange::Layout);
    }

    /// Non-positive or non-finite tempos are ignored.
    pub fn set_tempo(&mut self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::warn!(target: "context", "ignoring tempo {}", bpm);
            return;
        }
        self.context.transport.tempo = bpm;
        self.notifier.notify(ContextChange::Transport);
    }

    pub fn set_time_signature(&mut self, num: u8, den: u8) {
        if num == 0 || !den.is_power_of_two() {
            log::warn!(target: "context", "ignoring time signature {}/{}", num, den);
            return;
        }
        self.context.transport.time_sig_num = num;
        self.context.transport.time_sig_den = den;
        self.notifier.notify(ContextChange::Transport);
    }

    pub fn set_loop_region(&mut self, region: Option<LoopRegion>) {
        self.context.transport.loop_region = region.filter(|r| !r.is_empty());
        self.notifier.notify(ContextChange::Transport);
    }

    pub fn set_playhead(&mut self, tick: u64) {
        self.context.transport.playhead_tick = tick;
        self.notifier.notify(ContextChange::Transport);
    }

    pub fn play(&mut self) {
        self.context.transport.playing = true;
        self.notifier.notify(ContextChange::Transport);
    }

    pub fn stop(&mut self) {
        self.context.transport.playing = false;
        self.notifier.notify(ContextChange::Transport);
    }

    /// Drop every pointer at a stream that no longer exists.
    pub fn forget_stream(&mut self, id: &StreamId) {
        let mut changed = false;
        if self.context.active_stream_id.as_ref() == Some(id) {
            self.context.active_stream_id = None;
            self.notifier.notify(ContextChange::ActiveStream);
            changed = true;
        }
        let before = self.context.selection.events.len();
        self.context.selection.events.retain(|(s, _)| s != id);
        if self.context.selection.events.len() != before {
            self.notifier.notify(ContextChange::Selection);
            changed = true;
        }
        if changed {
            log::debug!(target: "context", "cleared references to stream {}", id);
        }
    }

    pub fn forget_clip(&mut self, id: &ClipId) {
        if self.context.active_clip_id.as_ref() == Some(id) {
            self.context.active_clip_id = None;
            self.notifier.notify(ContextChange::ActiveClip);
        }
        let before = self.context.selection.clips.len();
        self.context.selection.clips.retain(|c| c != id);
        if self.context.selection.clips.len() != before {
            self.notifier.notify(ContextChange::Selection);
        }
    }

    pub fn subscribe(&mut self, topic: Topic<ContextChange>, callback: Callback<ContextChange>) -> SubscriptionId {
        self.notifier.subscribe(topic, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub(crate) fn hold(&mut self) {
        self.notifier.hold();
    }

    pub(crate) fn release(&mut self) {
        self.notifier.release();
    }
}

impl Default for ContextCoordinator {
    fn default() -> Self {
        Self::new(Transport::default())
    }
}

/// Same view if the workspace shows it, else the workspace's primary view.
fn migrate_view(workspace: &WorkspaceDescriptor, view: ViewKind) -> Option<ViewKind> {
    if workspace.shows(view) {
        Some(view)
    } else {
        workspace.primary_view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn coordinator() -> ContextCoordinator {
        let mut c = ContextCoordinator::default();
        for kind in ViewKind::ALL {
            c.register_view_factory(kind);
        }
        c.register_workspace(WorkspaceDescriptor::new(
            "compose",
            "Compose",
            vec![ViewKind::PianoRoll, ViewKind::Notation],
        ))
        .unwrap();
        c.register_workspace(
            WorkspaceDescriptor::new("perform", "Perform", vec![ViewKind::ClipLauncher, ViewKind::StepGrid])
                .with_primary(ViewKind::StepGrid),
        )
        .unwrap();
        c
    }

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl WorkspaceHooks for Recorder {
        fn activate(&mut self, ws: &WorkspaceDescriptor, _: &ActiveContext) -> Result<(), HookError> {
            self.log.borrow_mut().push(format!("activate {}", ws.id));
            if self.fail {
                return Err("activation blew up".into());
            }
            Ok(())
        }

        fn deactivate(&mut self, ws: &WorkspaceDescriptor, _: &ActiveContext) -> Result<(), HookError> {
            self.log.borrow_mut().push(format!("deactivate {}", ws.id));
            if self.fail {
                return Err("deactivation blew up".into());
            }
            Ok(())
        }
    }

    #[test]
    fn default_switch_preserves_everything() {
        let mut c = coordinator();
        c.switch_workspace(&WorkspaceId::new("compose"), SwitchOptions::default()).unwrap();
        c.set_active_stream(Some(StreamId::new("stream-1")));
        c.set_active_clip(Some(ClipId::new("clip-1")));
        c.set_selection(Selection {
            events: vec![(StreamId::new("stream-1"), cadenza_types::EventId::new("event-3"))],
            clips: vec![],
        });
        c.play();
        let before = c.context().clone();

        c.switch_workspace(&WorkspaceId::new("perform"), SwitchOptions::default()).unwrap();
        let after = c.context();
        assert_eq!(after.active_stream_id, before.active_stream_id);
        assert_eq!(after.active_clip_id, before.active_clip_id);
        assert_eq!(after.selection, before.selection);
        assert_eq!(after.transport, before.transport);
        assert_eq!(after.layout, before.layout);
    }

    #[test]
    fn options_clear_what_they_name() {
        let mut c = coordinator();
        c.set_active_stream(Some(StreamId::new("stream-1")));
        c.play();
        let options = SwitchOptions {
            clear_active: true,
            stop_transport: true,
            ..Default::default()
        };
        c.switch_workspace(&WorkspaceId::new("perform"), options).unwrap();
        assert_eq!(c.context().active_stream_id, None);
        assert!(!c.transport().playing);
    }

    #[test]
    fn views_migrate_to_match_or_primary() {
        let mut c = coordinator();
        c.switch_workspace(&WorkspaceId::new("compose"), SwitchOptions::default()).unwrap();
        c.register_workspace(WorkspaceDescriptor::new(
            "mixed",
            "Mixed",
            vec![ViewKind::Notation, ViewKind::ClipLauncher],
        ))
        .unwrap();
        let report = c
            .switch_workspace(&WorkspaceId::new("mixed"), SwitchOptions::default())
            .unwrap();
        assert_eq!(report.from, Some(WorkspaceId::new("compose")));
        assert_eq!(
            report.migrations,
            vec![
                ViewMigration { from: ViewKind::PianoRoll, to: Some(ViewKind::Notation) },
                ViewMigration { from: ViewKind::Notation, to: Some(ViewKind::Notation) },
            ]
        );
        assert_eq!(c.context().active_view_kind, ViewKind::Notation);
    }

    #[test]
    fn active_view_falls_back_to_first_shown() {
        let mut c = coordinator();
        c.switch_workspace(&WorkspaceId::new("perform"), SwitchOptions::default()).unwrap();
        assert_eq!(c.context().active_view_kind, ViewKind::StepGrid);

        let mut bare = WorkspaceDescriptor::new("bare", "Bare", vec![ViewKind::Notation, ViewKind::PianoRoll]);
        bare.primary_view = None;
        c.register_workspace(bare).unwrap();
        let report = c
            .switch_workspace(&WorkspaceId::new("bare"), SwitchOptions::default())
            .unwrap();
        assert!(report.migrations.iter().all(|m| m.to.is_none()));
        assert_eq!(c.context().active_view_kind, ViewKind::Notation);
    }

    #[test]
    fn missing_view_factory_changes_nothing() {
        let mut c = ContextCoordinator::default();
        c.register_view_factory(ViewKind::PianoRoll);
        c.register_workspace(WorkspaceDescriptor::new("grid", "Grid", vec![ViewKind::StepGrid]))
            .unwrap();
        let before = c.context().clone();
        let err = c
            .switch_workspace(&WorkspaceId::new("grid"), SwitchOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: EntityKind::ViewFactory, .. }));
        assert_eq!(c.context(), &before);

        let err = c
            .switch_workspace(&WorkspaceId::new("nope"), SwitchOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: EntityKind::Workspace, .. }));
    }

    #[test]
    fn failing_hooks_do_not_block_and_notify_once() {
        let mut c = coordinator();
        let log = Rc::new(RefCell::new(Vec::new()));
        for id in ["compose", "perform"] {
            c.set_hooks(
                &WorkspaceId::new(id),
                Box::new(Recorder {
                    log: log.clone(),
                    fail: true,
                }),
            )
            .unwrap();
        }
        c.switch_workspace(&WorkspaceId::new("compose"), SwitchOptions::default()).unwrap();

        let hits = Rc::new(RefCell::new(0));
        let sink = hits.clone();
        c.subscribe(Topic::All, Box::new(move |_: &ContextChange| *sink.borrow_mut() += 1));
        c.switch_workspace(&WorkspaceId::new("perform"), SwitchOptions::default()).unwrap();

        assert_eq!(*hits.borrow(), 1);
        assert_eq!(
            *log.borrow(),
            vec!["activate compose", "deactivate compose", "activate perform"]
        );
        assert_eq!(c.context().active_workspace, Some(WorkspaceId::new("perform")));
    }

    #[test]
    fn forget_stream_clears_pointers() {
        let mut c = ContextCoordinator::default();
        let sid = StreamId::new("stream-2");
        c.set_active_stream(Some(sid.clone()));
        c.set_selection(Selection {
            events: vec![(sid.clone(), cadenza_types::EventId::new("event-1"))],
            clips: vec![],
        });
        c.forget_stream(&sid);
        assert_eq!(c.context().active_stream_id, None);
        assert!(c.context().selection.is_empty());
    }

    #[test]
    fn bad_transport_values_are_ignored() {
        let mut c = ContextCoordinator::default();
        c.set_tempo(-3.0);
        c.set_time_signature(7, 6);
        assert_eq!(c.transport(), &Transport::default());
        c.set_time_signature(7, 8);
        assert_eq!((c.transport().time_sig_num, c.transport().time_sig_den), (7, 8));
    }
}

//! Value-based edit commands recorded in the undo history.
//!
//! Every op carries the data it needs and is idempotent against the current
//! state: inserting something already present, or removing something already
//! gone, changes nothing. Inserts carry the creation-order index the entity
//! had, so undoing a removal puts it back where it was.

use cadenza_types::{
    Clip, ClipId, ConnectionId, CoreError, CoreResult, EntityKind, Event, EventDiff, EventId,
    EventStream, NodeId, NodeRemoval, RoutingConnection, RoutingNode, StreamId,
};

use super::undo::ApplyCommand;
use super::Stores;

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    InsertStream { stream: EventStream, at: Option<usize> },
    RemoveStream(StreamId),
    InsertEvents { stream: StreamId, events: Vec<Event> },
    RemoveEvents { stream: StreamId, ids: Vec<EventId> },
    /// Overwrite present events with these versions.
    ReplaceEvents { stream: StreamId, events: Vec<Event> },
    PutClip { clip: Clip, at: Option<usize> },
    RemoveClip(ClipId),
    InsertNode { node: RoutingNode, at: Option<usize> },
    RemoveNode(NodeId),
    InsertConnection { conn: RoutingConnection, at: Option<usize> },
    RemoveConnection(ConnectionId),
    SetConnection {
        id: ConnectionId,
        gain: Option<f32>,
        enabled: bool,
    },
}

/// Forward ops and their inverses, ready for `UndoStack::record`.
pub type OpPair = (Vec<EditOp>, Vec<EditOp>);

/// Ops that reproduce `diff` and ops that revert it. Empty for an empty diff.
pub fn event_diff_ops(diff: &EventDiff) -> OpPair {
    let stream = &diff.stream;
    let mut redo = Vec::new();
    let mut undo = Vec::new();
    if !diff.added.is_empty() {
        redo.push(EditOp::InsertEvents {
            stream: stream.clone(),
            events: diff.added.clone(),
        });
        undo.push(EditOp::RemoveEvents {
            stream: stream.clone(),
            ids: diff.added.iter().map(|e| e.id().clone()).collect(),
        });
    }
    if !diff.removed.is_empty() {
        redo.push(EditOp::RemoveEvents {
            stream: stream.clone(),
            ids: diff.removed.iter().map(|e| e.id().clone()).collect(),
        });
        undo.push(EditOp::InsertEvents {
            stream: stream.clone(),
            events: diff.removed.clone(),
        });
    }
    if !diff.updated.is_empty() {
        redo.push(EditOp::ReplaceEvents {
            stream: stream.clone(),
            events: diff.updated.iter().map(|(_, after)| after.clone()).collect(),
        });
        undo.push(EditOp::ReplaceEvents {
            stream: stream.clone(),
            events: diff.updated.iter().map(|(before, _)| before.clone()).collect(),
        });
    }
    undo.reverse();
    (redo, undo)
}

/// Removing a node also removed its connections: redo drops connections then
/// the node; undo restores the node first. `node_at` and `connections_at` are
/// the positions taken before removal, the latter parallel to
/// `removal.connections`.
pub fn node_removal_ops(
    removal: &NodeRemoval,
    node_at: Option<usize>,
    connections_at: &[Option<usize>],
) -> OpPair {
    let mut redo: Vec<EditOp> = removal
        .connections
        .iter()
        .map(|c| EditOp::RemoveConnection(c.id.clone()))
        .collect();
    redo.push(EditOp::RemoveNode(removal.node.id.clone()));

    let mut undo = vec![EditOp::InsertNode {
        node: removal.node.clone(),
        at: node_at,
    }];
    for (i, conn) in removal.connections.iter().enumerate() {
        undo.push(EditOp::InsertConnection {
            conn: conn.clone(),
            at: connections_at.get(i).copied().flatten(),
        });
    }
    (redo, undo)
}

impl ApplyCommand<EditOp> for Stores {
    type Error = CoreError;

    fn apply(&mut self, op: &EditOp) -> CoreResult<()> {
        match op {
            EditOp::InsertStream { stream, at } => match self.events.get_stream(&stream.id) {
                Some(live) if live == stream => Ok(()),
                Some(_) => {
                    log::warn!(target: "undo", "stream {} diverged from history; replacing", stream.id);
                    let at = self.events.stream_position(&stream.id);
                    self.events.destroy_stream(&stream.id)?;
                    self.events.insert_stream_at(stream.clone(), at.unwrap_or(usize::MAX))
                }
                None => self.events.insert_stream_at(stream.clone(), at.unwrap_or(usize::MAX)),
            },
            EditOp::RemoveStream(id) => {
                if self.events.contains(id) {
                    self.events.destroy_stream(id)?;
                }
                Ok(())
            }
            EditOp::InsertEvents { stream, events } => self.events.restore_events(stream, events),
            EditOp::RemoveEvents { stream, ids } => {
                self.events.remove_events(stream, ids).map(|_| ())
            }
            EditOp::ReplaceEvents { stream, events } => {
                self.events.overwrite_events(stream, events)
            }
            EditOp::PutClip { clip, at } => {
                if !self.events.contains(&clip.stream_id) {
                    return Err(CoreError::not_found(EntityKind::Stream, &clip.stream_id));
                }
                self.clips.put_clip(clip.clone(), *at);
                Ok(())
            }
            EditOp::RemoveClip(id) => {
                self.clips.remove_if_present(id);
                Ok(())
            }
            EditOp::InsertNode { node, at } => match self.routing.node(&node.id) {
                Some(live) if live == node => Ok(()),
                Some(_) => Err(CoreError::duplicate(EntityKind::Node, &node.id)),
                None => self
                    .routing
                    .insert_node_at(node.clone(), at.unwrap_or(usize::MAX))
                    .map(|_| ()),
            },
            EditOp::RemoveNode(id) => {
                if self.routing.node(id).is_some() {
                    self.routing.remove_node(id)?;
                }
                Ok(())
            }
            EditOp::InsertConnection { conn, at } => match self.routing.connection(&conn.id) {
                Some(live) if live == conn => Ok(()),
                Some(_) => {
                    self.routing.set_connection_gain(&conn.id, conn.gain)?;
                    self.routing.set_connection_enabled(&conn.id, conn.enabled)?;
                    Ok(())
                }
                None => self
                    .routing
                    .insert_connection_at(conn.clone(), at.unwrap_or(usize::MAX)),
            },
            EditOp::RemoveConnection(id) => {
                if self.routing.connection(id).is_some() {
                    self.routing.remove_connection(id)?;
                }
                Ok(())
            }
            EditOp::SetConnection { id, gain, enabled } => {
                self.routing.set_connection_gain(id, *gain)?;
                self.routing.set_connection_enabled(id, *enabled)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_types::{ClipMeta, ConnectionRequest, Port, PortType};

    fn stores() -> (Stores, StreamId) {
        let mut stores = Stores::default();
        let sid = stores.events.create_stream("bass");
        (stores, sid)
    }

    fn run(stores: &mut Stores, ops: &[EditOp]) {
        for op in ops {
            stores.apply(op).unwrap();
        }
    }

    #[test]
    fn event_ops_replay_and_revert() {
        let (mut stores, sid) = stores();
        let diff = stores
            .events
            .add_events(&sid, vec![Event::note("e1", 0, 48, 36, 90)])
            .unwrap();
        let (redo, undo) = event_diff_ops(&diff);

        run(&mut stores, &undo);
        assert!(stores.events.get_stream(&sid).unwrap().is_empty());
        // a second undo changes nothing
        run(&mut stores, &undo);
        assert!(stores.events.get_stream(&sid).unwrap().is_empty());

        run(&mut stores, &redo);
        run(&mut stores, &redo);
        assert_eq!(stores.events.get_stream(&sid).unwrap().len(), 1);
    }

    #[test]
    fn empty_diff_produces_no_ops() {
        let (redo, undo) = event_diff_ops(&EventDiff::empty(StreamId::new("s")));
        assert!(redo.is_empty() && undo.is_empty());
    }

    #[test]
    fn clip_ops_are_idempotent() {
        let (mut stores, sid) = stores();
        let id = stores
            .clips
            .create_clip(&stores.events, &sid, ClipMeta::new("intro", 384))
            .unwrap();
        let clip = stores.clips.get_clip(&id).unwrap().clone();

        run(&mut stores, &[EditOp::RemoveClip(id.clone()), EditOp::RemoveClip(id.clone())]);
        assert!(stores.clips.is_empty());
        let put = EditOp::PutClip {
            clip: clip.clone(),
            at: Some(0),
        };
        run(&mut stores, &[put.clone(), put]);
        assert_eq!(stores.clips.clip_ids(), &[id]);
    }

    #[test]
    fn clip_needs_its_stream() {
        let (mut stores, sid) = stores();
        let id = stores
            .clips
            .create_clip(&stores.events, &sid, ClipMeta::new("intro", 384))
            .unwrap();
        let clip = stores.clips.delete_clip(&id).unwrap();
        stores.events.destroy_stream(&sid).unwrap();
        assert!(stores.apply(&EditOp::PutClip { clip, at: None }).is_err());
    }

    #[test]
    fn node_removal_round_trip() {
        let (mut stores, _) = stores();
        for id in ["osc", "out"] {
            stores
                .routing
                .add_node(
                    RoutingNode::new(id, "test")
                        .with_port(Port::input("in", "In", PortType::Audio))
                        .with_port(Port::output("out", "Out", PortType::Audio)),
                )
                .unwrap();
        }
        let conn = stores
            .routing
            .add_connection(ConnectionRequest::new("osc", "out", "out", "in"))
            .unwrap();
        let osc = NodeId::new("osc");
        let node_at = stores.routing.node_position(&osc);
        let conn_at = vec![stores.routing.connection_position(&conn)];
        let removal = stores.routing.remove_node(&osc).unwrap();
        let (redo, undo) = node_removal_ops(&removal, node_at, &conn_at);

        run(&mut stores, &undo);
        assert!(stores.routing.connection(&conn).is_some());
        assert_eq!(stores.routing.node_ids()[0], osc);
        run(&mut stores, &redo);
        assert!(stores.routing.node(&NodeId::new("osc")).is_none());
        assert!(stores.routing.connection_ids().is_empty());
    }
}

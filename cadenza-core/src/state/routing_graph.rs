//! Typed routing graph between signal-processing nodes.
//!
//! Nodes and connections live in flat maps keyed by id; cycle detection is an
//! explicit traversal over those maps. Every accepted change is pushed, in
//! order, to each delta receiver so an audio engine can follow along.

use std::collections::{HashMap, HashSet, VecDeque};

use crossbeam_channel::{Receiver, Sender};

use cadenza_types::{
    ConnectionId, ConnectionRejection, ConnectionRequest, CoreError, CoreResult, EntityKind,
    IdAllocator, NodeId, NodeRemoval, Port, PortDirection, PortId, PortType, RoutingConnection,
    RoutingDelta, RoutingNode,
};

use super::notify::{Callback, Notifier, SubscriptionId, Topic};

pub struct RoutingGraph {
    nodes: HashMap<NodeId, RoutingNode>,
    node_order: Vec<NodeId>,
    connections: HashMap<ConnectionId, RoutingConnection>,
    connection_order: Vec<ConnectionId>,
    node_ids: IdAllocator,
    connection_ids: IdAllocator,
    allow_modulation_feedback: bool,
    delta_senders: Vec<Sender<RoutingDelta>>,
    notifier: Notifier<NodeId>,
}

impl RoutingGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            node_order: Vec::new(),
            connections: HashMap::new(),
            connection_order: Vec::new(),
            node_ids: IdAllocator::new("node"),
            connection_ids: IdAllocator::new("conn"),
            allow_modulation_feedback: true,
            delta_senders: Vec::new(),
            notifier: Notifier::new(),
        }
    }

    /// Whether modulation connections may close a loop (feedback modulation).
    pub fn set_allow_modulation_feedback(&mut self, allow: bool) {
        self.allow_modulation_feedback = allow;
    }

    pub fn allows_modulation_feedback(&self) -> bool {
        self.allow_modulation_feedback
    }

    /// A node id not yet used in this graph.
    pub fn next_node_id(&mut self) -> NodeId {
        loop {
            let candidate = NodeId::new(self.node_ids.next_raw());
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn add_node(&mut self, node: RoutingNode) -> CoreResult<NodeId> {
        let end = self.node_order.len();
        self.insert_node_at(node, end)
    }

    /// As `add_node`, placing the node at `index` in creation order (clamped).
    pub(crate) fn insert_node_at(&mut self, node: RoutingNode, index: usize) -> CoreResult<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::duplicate(EntityKind::Node, &node.id));
        }
        let mut seen = HashSet::new();
        for port in node.ports() {
            if !seen.insert(&port.id) {
                return Err(CoreError::duplicate(EntityKind::Port, format!("{}:{}", node.id, port.id)));
            }
        }
        self.node_ids.observe(node.id.as_str());
        let id = node.id.clone();
        log::debug!(target: "routing", "added node {} ({})", id, node.kind);
        self.nodes.insert(id.clone(), node);
        self.node_order.insert(index.min(self.node_order.len()), id.clone());
        self.notifier.notify(id.clone());
        Ok(id)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> CoreResult<NodeRemoval> {
        if !self.nodes.contains_key(id) {
            return Err(CoreError::not_found(EntityKind::Node, id));
        }
        let incident: Vec<ConnectionId> = self
            .connection_order
            .iter()
            .filter(|c| self.connections.get(*c).is_some_and(|conn| conn.touches(id)))
            .cloned()
            .collect();
        let mut connections = Vec::with_capacity(incident.len());
        for conn_id in &incident {
            connections.push(self.remove_connection(conn_id)?);
        }
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Node, id))?;
        self.node_order.retain(|n| n != id);
        log::debug!(
            target: "routing",
            "removed node {} with {} connection(s)",
            id,
            connections.len()
        );
        self.notifier.notify(id.clone());
        Ok(NodeRemoval { node, connections })
    }

    /// Validate and wire a new connection. The graph assigns id and type.
    pub fn add_connection(&mut self, request: ConnectionRequest) -> CoreResult<ConnectionId> {
        check_gain(&request.source_node, request.gain)?;
        let connection_type = self.check(
            &request.source_node,
            &request.source_port,
            &request.target_node,
            &request.target_port,
        )?;
        let id = loop {
            let candidate = ConnectionId::new(self.connection_ids.next_raw());
            if !self.connections.contains_key(&candidate) {
                break candidate;
            }
        };
        let conn = RoutingConnection {
            id: id.clone(),
            source_node: request.source_node,
            source_port: request.source_port,
            target_node: request.target_node,
            target_port: request.target_port,
            connection_type,
            gain: request.gain,
            enabled: true,
        };
        let end = self.connection_order.len();
        self.attach(conn, end);
        Ok(id)
    }

    /// Re-insert a complete connection record (snapshot restore, undo). Runs the
    /// same validation as `add_connection`.
    pub fn insert_connection(&mut self, conn: RoutingConnection) -> CoreResult<()> {
        let end = self.connection_order.len();
        self.insert_connection_at(conn, end)
    }

    /// As `insert_connection`, placing it at `index` in creation order (clamped).
    pub(crate) fn insert_connection_at(
        &mut self,
        conn: RoutingConnection,
        index: usize,
    ) -> CoreResult<()> {
        if self.connections.contains_key(&conn.id) {
            return Err(CoreError::duplicate(EntityKind::Connection, &conn.id));
        }
        check_gain(&conn.id, conn.gain)?;
        let connection_type =
            self.check(&conn.source_node, &conn.source_port, &conn.target_node, &conn.target_port)?;
        if connection_type != conn.connection_type {
            return Err(CoreError::rejected(ConnectionRejection::TypeMismatch));
        }
        self.connection_ids.observe(conn.id.as_str());
        self.attach(conn, index);
        Ok(())
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> CoreResult<RoutingConnection> {
        let conn = self
            .connections
            .remove(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, id))?;
        self.connection_order.retain(|c| c != id);
        log::debug!(target: "routing", "removed {} connection {}", conn.connection_type, id);
        self.emit(RoutingDelta::removed(&conn));
        self.notifier.notify(conn.source_node.clone());
        self.notifier.notify(conn.target_node.clone());
        Ok(conn)
    }

    /// Returns the previous gain. Non-finite gains are refused.
    pub fn set_connection_gain(&mut self, id: &ConnectionId, gain: Option<f32>) -> CoreResult<Option<f32>> {
        check_gain(id, gain)?;
        let conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, id))?;
        let previous = conn.gain;
        if previous != gain {
            conn.gain = gain;
            let conn = conn.clone();
            self.changed(&conn);
        }
        Ok(previous)
    }

    /// Returns the previous enabled flag.
    pub fn set_connection_enabled(&mut self, id: &ConnectionId, enabled: bool) -> CoreResult<bool> {
        let conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Connection, id))?;
        let previous = conn.enabled;
        if previous != enabled {
            conn.enabled = enabled;
            let conn = conn.clone();
            self.changed(&conn);
        }
        Ok(previous)
    }

    pub fn node(&self, id: &NodeId) -> Option<&RoutingNode> {
        self.nodes.get(id)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&RoutingConnection> {
        self.connections.get(id)
    }

    /// Node ids in creation order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_order
    }

    pub fn connection_ids(&self) -> &[ConnectionId] {
        &self.connection_order
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoutingNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_position(&self, id: &NodeId) -> Option<usize> {
        self.node_order.iter().position(|n| n == id)
    }

    pub fn connection_position(&self, id: &ConnectionId) -> Option<usize> {
        self.connection_order.iter().position(|c| c == id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &RoutingConnection> {
        self.connection_order
            .iter()
            .filter_map(|id| self.connections.get(id))
    }

    pub fn connections_for_node(&self, id: &NodeId) -> Vec<&RoutingConnection> {
        self.connections().filter(|c| c.touches(id)).collect()
    }

    pub fn inbound(&self, id: &NodeId) -> Vec<&RoutingConnection> {
        self.connections().filter(|c| &c.target_node == id).collect()
    }

    pub fn outbound(&self, id: &NodeId) -> Vec<&RoutingConnection> {
        self.connections().filter(|c| &c.source_node == id).collect()
    }

    /// Topological order over audio connections (Kahn's algorithm). Ties keep
    /// node creation order.
    pub fn processing_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.node_order.iter().map(|id| (id, 0)).collect();
        for conn in self.connections().filter(|c| c.connection_type == PortType::Audio) {
            if let Some(d) = in_degree.get_mut(&conn.target_node) {
                *d += 1;
            }
        }
        let mut ready: VecDeque<&NodeId> = self
            .node_order
            .iter()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.node_order.len());
        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for conn in self
                .connections()
                .filter(|c| c.connection_type == PortType::Audio && &c.source_node == id)
            {
                if let Some(d) = in_degree.get_mut(&conn.target_node) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(&conn.target_node);
                    }
                }
            }
        }
        if order.len() != self.node_order.len() {
            log::error!(target: "routing", "audio graph contains a cycle; processing order is partial");
        }
        order
    }

    /// True if connections of `port_type` form a directed cycle anywhere.
    pub fn has_cycle(&self, port_type: PortType) -> bool {
        self.connections()
            .filter(|c| c.connection_type == port_type)
            .any(|c| self.reaches(&c.target_node, &c.source_node, port_type))
    }

    /// A new receiver for the ordered connection delta feed.
    pub fn subscribe_deltas(&mut self) -> Receiver<RoutingDelta> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.delta_senders.push(tx);
        rx
    }

    /// View-facing "graph changed" subscription, per node or for all nodes.
    pub fn subscribe(&mut self, topic: Topic<NodeId>, callback: Callback<NodeId>) -> SubscriptionId {
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

    /// Remove everything, emitting a removal delta per connection.
    pub(crate) fn clear(&mut self) {
        let conn_ids = self.connection_order.clone();
        for id in &conn_ids {
            let _ = self.remove_connection(id);
        }
        let node_ids = std::mem::take(&mut self.node_order);
        self.nodes.clear();
        self.node_ids.reset();
        self.connection_ids.reset();
        for id in node_ids {
            self.notifier.notify(id);
        }
    }

    /// Resolve endpoints and apply direction, type and cycle rules, in that order.
    fn check(
        &self,
        source_node: &NodeId,
        source_port: &PortId,
        target_node: &NodeId,
        target_port: &PortId,
    ) -> CoreResult<PortType> {
        let source = self.port(source_node, source_port)?;
        let target = self.port(target_node, target_port)?;

        if source.direction != PortDirection::Output || target.direction != PortDirection::Input {
            return Err(self.reject(ConnectionRejection::Direction, source_node, target_node));
        }
        if !types_compatible(source, target) {
            return Err(self.reject(ConnectionRejection::TypeMismatch, source_node, target_node));
        }
        let edge_type = source.port_type;
        let feedback_ok = edge_type == PortType::Modulation && self.allow_modulation_feedback;
        if !feedback_ok && self.reaches(target_node, source_node, edge_type) {
            return Err(self.reject(ConnectionRejection::Cycle, source_node, target_node));
        }
        Ok(edge_type)
    }

    fn port(&self, node: &NodeId, port: &PortId) -> CoreResult<&Port> {
        self.nodes
            .get(node)
            .ok_or_else(|| CoreError::not_found(EntityKind::Node, node))?
            .port(port)
            .ok_or_else(|| CoreError::not_found(EntityKind::Port, format!("{}:{}", node, port)))
    }

    fn reject(&self, reason: ConnectionRejection, source: &NodeId, target: &NodeId) -> CoreError {
        log::debug!(target: "routing", "rejected {} -> {}: {}", source, target, reason);
        CoreError::rejected(reason)
    }

    /// Depth-first search along edges of one type.
    fn reaches(&self, from: &NodeId, to: &NodeId, edge_type: PortType) -> bool {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            for conn in self.connections.values() {
                if conn.connection_type == edge_type && &conn.source_node == current {
                    stack.push(&conn.target_node);
                }
            }
        }
        false
    }

    fn attach(&mut self, conn: RoutingConnection, index: usize) {
        log::debug!(
            target: "routing",
            "connected {}:{} -> {}:{} ({})",
            conn.source_node,
            conn.source_port,
            conn.target_node,
            conn.target_port,
            conn.connection_type
        );
        self.emit(RoutingDelta::added(&conn));
        self.notifier.notify(conn.source_node.clone());
        self.notifier.notify(conn.target_node.clone());
        let id = conn.id.clone();
        self.connections.insert(id.clone(), conn);
        self.connection_order.insert(index.min(self.connection_order.len()), id);
    }

    fn changed(&mut self, conn: &RoutingConnection) {
        self.emit(RoutingDelta::changed(conn));
        self.notifier.notify(conn.source_node.clone());
        self.notifier.notify(conn.target_node.clone());
    }

    fn emit(&mut self, delta: RoutingDelta) {
        self.delta_senders.retain(|tx| tx.send(delta.clone()).is_ok());
    }
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn check_gain(owner: &impl std::fmt::Display, gain: Option<f32>) -> CoreResult<()> {
    match gain {
        Some(g) if !g.is_finite() => Err(CoreError::InvalidValue(format!("gain {} on {}", g, owner))),
        _ => Ok(()),
    }
}

/// audio→audio and midi→midi exactly; trigger into any input; modulation into
/// any parameter-bearing input or a modulation input.
fn types_compatible(source: &Port, target: &Port) -> bool {
    match source.port_type {
        PortType::Audio => target.port_type == PortType::Audio,
        PortType::Midi => target.port_type == PortType::Midi,
        PortType::Trigger => true,
        PortType::Modulation => target.parameter || target.port_type == PortType::Modulation,
    }
}

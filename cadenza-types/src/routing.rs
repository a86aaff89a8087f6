//! Routing vocabulary: nodes, typed ports, connections and engine deltas.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, NodeId, PortId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Audio,
    Midi,
    Modulation,
    Trigger,
}

impl PortType {
    pub fn as_str(self) -> &'static str {
        match self {
            PortType::Audio => "audio",
            PortType::Midi => "midi",
            PortType::Modulation => "modulation",
            PortType::Trigger => "trigger",
        }
    }
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub label: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    pub direction: PortDirection,
    /// Input drives a node parameter and accepts modulation of any nominal type.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parameter: bool,
}

impl Port {
    pub fn input(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: PortId::new(id),
            label: label.into(),
            port_type,
            direction: PortDirection::Input,
            parameter: false,
        }
    }

    pub fn output(id: impl Into<String>, label: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: PortId::new(id),
            label: label.into(),
            port_type,
            direction: PortDirection::Output,
            parameter: false,
        }
    }

    /// Mark this port as parameter-bearing.
    pub fn parameter(mut self) -> Self {
        self.parameter = true;
        self
    }
}

/// A signal-processing endpoint. Ports are unique per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingNode {
    pub id: NodeId,
    pub kind: String,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
}

impl RoutingNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            kind: kind.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Adds the port to `inputs` or `outputs` according to its direction.
    pub fn with_port(mut self, port: Port) -> Self {
        match port.direction {
            PortDirection::Input => self.inputs.push(port),
            PortDirection::Output => self.outputs.push(port),
        }
        self
    }

    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|p| &p.id == id)
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

/// A typed link between an output port and an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConnection {
    pub id: ConnectionId,
    pub source_node: NodeId,
    pub source_port: PortId,
    pub target_node: NodeId,
    pub target_port: PortId,
    #[serde(rename = "type")]
    pub connection_type: PortType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    pub enabled: bool,
}

impl RoutingConnection {
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source_node == node || &self.target_node == node
    }
}

/// What a caller supplies to wire two ports. The graph assigns the id and type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    pub source_node: NodeId,
    pub source_port: PortId,
    pub target_node: NodeId,
    pub target_port: PortId,
    pub gain: Option<f32>,
}

impl ConnectionRequest {
    pub fn new(
        source_node: impl Into<String>,
        source_port: impl Into<String>,
        target_node: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_node: NodeId::new(source_node),
            source_port: PortId::new(source_port),
            target_node: NodeId::new(target_node),
            target_port: PortId::new(target_port),
            gain: None,
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }
}

/// A removed node together with the connections that went with it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRemoval {
    pub node: RoutingNode,
    pub connections: Vec<RoutingConnection>,
}

/// Ordered change feed for the audio engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDelta {
    ConnectionAdded {
        id: ConnectionId,
        connection_type: PortType,
        gain: Option<f32>,
        enabled: bool,
        source: (NodeId, PortId),
        target: (NodeId, PortId),
    },
    ConnectionRemoved {
        id: ConnectionId,
        connection_type: PortType,
        gain: Option<f32>,
    },
    ConnectionChanged {
        id: ConnectionId,
        connection_type: PortType,
        gain: Option<f32>,
        enabled: bool,
    },
}

impl RoutingDelta {
    pub fn added(conn: &RoutingConnection) -> Self {
        RoutingDelta::ConnectionAdded {
            id: conn.id.clone(),
            connection_type: conn.connection_type,
            gain: conn.gain,
            enabled: conn.enabled,
            source: (conn.source_node.clone(), conn.source_port.clone()),
            target: (conn.target_node.clone(), conn.target_port.clone()),
        }
    }

    pub fn removed(conn: &RoutingConnection) -> Self {
        RoutingDelta::ConnectionRemoved {
            id: conn.id.clone(),
            connection_type: conn.connection_type,
            gain: conn.gain,
        }
    }

    pub fn changed(conn: &RoutingConnection) -> Self {
        RoutingDelta::ConnectionChanged {
            id: conn.id.clone(),
            connection_type: conn.connection_type,
            gain: conn.gain,
            enabled: conn.enabled,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            RoutingDelta::ConnectionAdded { id, .. }
            | RoutingDelta::ConnectionRemoved { id, .. }
            | RoutingDelta::ConnectionChanged { id, .. } => id,
        }
    }
}

//! The persisted project document.

use serde::{Deserialize, Serialize};

use crate::{Clip, EventStream, RoutingConnection, RoutingNode};

/// Current snapshot document version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// `{version, streams, clips, routing: {nodes, connections}}`, each list in
/// creation order so that serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub version: u32,
    #[serde(default)]
    pub streams: Vec<EventStream>,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub routing: RoutingSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    #[serde(default)]
    pub nodes: Vec<RoutingNode>,
    #[serde(default)]
    pub connections: Vec<RoutingConnection>,
}

impl ProjectSnapshot {
    pub fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            streams: Vec::new(),
            clips: Vec::new(),
            routing: RoutingSnapshot::default(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.streams.iter().map(|s| s.len()).sum()
    }
}

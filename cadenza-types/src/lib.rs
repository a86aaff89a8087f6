//! # cadenza-types
//!
//! Shared type definitions for the Cadenza state core.
//! Plain data only: ids, events, clips, routing vocabulary, the active context,
//! the snapshot document and the error taxonomy. Behavior lives in cadenza-core.

mod clip;
mod context;
mod error;
mod event;
mod routing;
mod snapshot;

pub use clip::{Clip, ClipColor, ClipMeta, ClipPatch};
pub use context::{
    ActiveContext, LayoutState, LoopRegion, Selection, SwitchOptions, Transport, ViewKind,
    ViewMigration, WorkspaceDescriptor,
};
pub use error::{ConnectionRejection, CoreError, CoreResult, EntityKind};
pub use event::{Event, EventDiff, EventKind, EventPatch, EventPayload, EventStream, Tick};
pub use routing::{
    ConnectionRequest, NodeRemoval, Port, PortDirection, PortType, RoutingConnection,
    RoutingDelta, RoutingNode,
};
pub use snapshot::{ProjectSnapshot, RoutingSnapshot, SNAPSHOT_VERSION};

/// Declares an opaque string id newtype.
///
/// Ids serialize as bare strings. Generated ids look like `stream-3`; see
/// [`IdAllocator`].
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an event stream.
    StreamId
);
string_id!(
    /// Identifier of an event, unique within its stream.
    EventId
);
string_id!(
    /// Identifier of a clip.
    ClipId
);
string_id!(
    /// Identifier of a track (owned by an outer surface; the core only points at it).
    TrackId
);
string_id!(
    /// Identifier of a routing node.
    NodeId
);
string_id!(
    /// Identifier of a port, unique within its node.
    PortId
);
string_id!(
    /// Identifier of a routing connection.
    ConnectionId
);
string_id!(
    /// Identifier of a workspace (a named arrangement of views).
    WorkspaceId
);

/// Hands out `<prefix>-<n>` ids and skips past ids seen on restore.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    prefix: &'static str,
    next: u64,
}

impl IdAllocator {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    /// Allocate the next raw id string.
    pub fn next_raw(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }

    /// Make sure future ids never collide with `id` if it uses our prefix.
    pub fn observe(&mut self, id: &str) {
        let Some(rest) = id.strip_prefix(self.prefix) else {
            return;
        };
        if let Some(n) = rest.strip_prefix('-').and_then(|n| n.parse::<u64>().ok()) {
            if n >= self.next {
                self.next = n + 1;
            }
        }
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = StreamId::new("stream-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"stream-7\"");
        let back: StreamId = serde_json::from_str("\"stream-7\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn allocator_counts_up() {
        let mut alloc = IdAllocator::new("clip");
        assert_eq!(alloc.next_raw(), "clip-1");
        assert_eq!(alloc.next_raw(), "clip-2");
    }

    #[test]
    fn allocator_skips_observed_ids() {
        let mut alloc = IdAllocator::new("node");
        alloc.observe("node-41");
        alloc.observe("node-3");
        alloc.observe("synth-99");
        alloc.observe("node-abc");
        assert_eq!(alloc.next_raw(), "node-42");
    }
}

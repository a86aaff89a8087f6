use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Stream,
    Event,
    Clip,
    Node,
    Port,
    Connection,
    Workspace,
    ViewFactory,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Stream => "stream",
            EntityKind::Event => "event",
            EntityKind::Clip => "clip",
            EntityKind::Node => "node",
            EntityKind::Port => "port",
            EntityKind::Connection => "connection",
            EntityKind::Workspace => "workspace",
            EntityKind::ViewFactory => "view factory",
        })
    }
}

/// Why the routing graph refused a connection. Rendered verbatim to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRejection {
    Direction,
    TypeMismatch,
    Cycle,
}

impl ConnectionRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionRejection::Direction => "direction",
            ConnectionRejection::TypeMismatch => "type-mismatch",
            ConnectionRejection::Cycle => "cycle",
        }
    }
}

impl std::fmt::Display for ConnectionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("{reason}")]
    InvalidConnection { reason: ConnectionRejection },

    #[error("duplicate {entity} id: {id}")]
    DuplicateId { entity: EntityKind, id: String },

    #[error("preference quota exceeded in '{namespace}': {needed} bytes > {quota}")]
    QuotaExceeded {
        namespace: String,
        needed: usize,
        quota: usize,
    },

    #[error("stream {stream} is still referenced by {} clip(s)", .clips.len())]
    StreamInUse { stream: String, clips: Vec<String> },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("snapshot version {found} is newer than supported ({supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("io error: {0}")]
    Io(String),
}

impl CoreError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: EntityKind, id: impl ToString) -> Self {
        CoreError::DuplicateId {
            entity,
            id: id.to_string(),
        }
    }

    pub fn rejected(reason: ConnectionRejection) -> Self {
        CoreError::InvalidConnection { reason }
    }

    /// The string shown to the user for a rejected operation.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn rejection(&self) -> Option<ConnectionRejection> {
        match self {
            CoreError::InvalidConnection { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_reasons_render_verbatim() {
        assert_eq!(CoreError::rejected(ConnectionRejection::Cycle).reason(), "cycle");
        assert_eq!(
            CoreError::rejected(ConnectionRejection::TypeMismatch).reason(),
            "type-mismatch"
        );
        assert_eq!(
            CoreError::rejected(ConnectionRejection::Direction).reason(),
            "direction"
        );
    }

    #[test]
    fn not_found_names_entity_and_id() {
        let e = CoreError::not_found(EntityKind::Stream, "stream-9");
        assert_eq!(e.reason(), "stream not found: stream-9");
    }
}

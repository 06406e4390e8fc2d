//! Error types for treesync-core.

use thiserror::Error;

/// Result type alias using treesync-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synchronizing a tree with its client.
#[derive(Error, Debug)]
pub enum Error {
    /// An inbound UI event referenced an id the registry cannot resolve.
    #[error("No node found for id {node_id}")]
    UnknownNodeId { node_id: String },

    /// Node ids survived adapter teardown.
    #[error("Not all nodes have been disposed: {remaining} id(s) left ({node_ids:?})")]
    RegistryLeak {
        remaining: usize,
        node_ids: Vec<String>,
    },

    /// Inbound UI event is missing a field or has the wrong shape.
    #[error("Malformed UI event: {0}")]
    MalformedUiEvent(String),

    /// Internal bookkeeping went out of sync for a single event.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A caller passed arguments the tree API rejects.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The tree model has no node with this key.
    #[error("Unknown tree node {key}")]
    UnknownNode { key: crate::model::NodeKey },

    /// Operation requires an attached adapter
    #[error("Adapter is not attached to a tree model")]
    NotAttached,

    /// attach() was called twice
    #[error("Adapter is already attached to a tree model")]
    AlreadyAttached,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the adapter must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Reject the single offending event and carry on.
    Recoverable,
    /// The session mapping is corrupt; terminate the session.
    Fatal,
}

impl Error {
    /// Create an unknown node id error.
    pub fn unknown_node_id(node_id: impl Into<String>) -> Self {
        Self::UnknownNodeId {
            node_id: node_id.into(),
        }
    }

    /// Create a registry leak error from the ids that are still mapped.
    pub fn registry_leak(node_ids: Vec<String>) -> Self {
        Self::RegistryLeak {
            remaining: node_ids.len(),
            node_ids,
        }
    }

    /// Create a malformed UI event error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedUiEvent(message.into())
    }

    /// Create an unknown tree node error.
    pub fn unknown_node(key: crate::model::NodeKey) -> Self {
        Self::UnknownNode { key }
    }

    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classify the error. Only a leak found at teardown is fatal; every
    /// other error is confined to the event or call that raised it.
    pub fn severity(&self) -> Severity {
        match self {
            Self::RegistryLeak { .. } => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    /// Shorthand for `severity() == Severity::Fatal`.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_leak_counts_ids() {
        let err = Error::registry_leak(vec!["n1".to_string(), "n2".to_string()]);
        match &err {
            Error::RegistryLeak { remaining, .. } => assert_eq!(*remaining, 2),
            _ => panic!("Wrong error variant"),
        }
        assert!(err.is_fatal());
        assert!(err.to_string().contains("n1"));
    }

    #[test]
    fn test_unknown_node_id_is_recoverable() {
        let err = Error::unknown_node_id("abc");
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(err.to_string(), "No node found for id abc");
    }

    #[test]
    fn test_invariant_violation_is_recoverable() {
        let err = Error::invariant("update references a retired node");
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(
            err.to_string(),
            "Invariant violation: update references a retired node"
        );
    }

    #[test]
    fn test_invalid_argument_is_recoverable() {
        let err = Error::invalid_argument("not a permutation");
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!err.is_fatal());
    }
}

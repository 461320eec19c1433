//! Error types for directed graph operations.

use thiserror::Error;

/// Result type for directed graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or enumerating a directed graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A different node is already registered under the same key.
    #[error("Graph already contains a different node with key '{key}'")]
    DuplicateKey {
        /// The conflicting key.
        key: String,
    },

    /// A graph was asked to depend on itself.
    #[error("Graph '{key}' cannot depend on itself")]
    SelfDependency {
        /// Key of the graph root.
        key: String,
    },

    /// A dependency cycle was detected in the graph.
    #[error("Cycle detected in dependency graph: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Keys of the nodes participating in the cycle.
        cycle: Vec<String>,
    },

    /// A node key was referenced that the graph does not contain.
    #[error("Graph has no node with key '{key}'")]
    NodeNotFound {
        /// The missing key.
        key: String,
    },

    /// A pinned dependency points at a node that has already been dropped.
    #[error("Node '{node}' has a pinned dependency on '{dependency}' which no longer exists")]
    DanglingDependency {
        /// The node holding the pinned edge.
        node: String,
        /// Key of the dropped dependency.
        dependency: String,
    },
}

impl Error {
    /// Create a duplicate key error.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create a node not found error.
    pub fn node_not_found(key: impl Into<String>) -> Self {
        Self::NodeNotFound { key: key.into() }
    }
}

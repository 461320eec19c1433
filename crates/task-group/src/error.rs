//! Error types for the fluentcore-task-group crate

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a task's own work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for task group operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Building or enumerating the underlying graph failed
    #[error(transparent)]
    #[diagnostic(code(fluentcore::graph))]
    Graph(#[from] fluentcore_task_graph::Error),

    /// A task key was looked up that the group does not contain
    #[error("A dependency task with key '{key}' is not found")]
    #[diagnostic(
        code(fluentcore::task::not_found),
        help("Results can only be looked up for tasks reachable from the invoked group")
    )]
    TaskNotFound {
        /// The missing key
        key: String,
    },

    /// The preparation fixpoint kept discovering new tasks
    #[error("Task group preparation did not converge after {passes} passes")]
    #[diagnostic(
        code(fluentcore::prepare::diverged),
        help("A before-invoke hook keeps adding new tasks; raise maxPreparePasses if the growth is bounded")
    )]
    PrepareDidNotConverge {
        /// Number of passes that were run
        passes: usize,
    },

    /// The invocation finished without producing a root result
    #[error("Task '{key}' completed without a result")]
    #[diagnostic(code(fluentcore::task::no_result))]
    NoResult {
        /// Key of the root task
        key: String,
    },

    /// One or more tasks faulted during invocation
    #[error("Task group invocation faulted with {} error(s)", faults.len())]
    #[diagnostic(code(fluentcore::invoke::faulted))]
    Faulted {
        /// The faults raised by task code, in the order they settled
        #[related]
        faults: Vec<FaultKind>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(fluentcore::config::invalid))]
    Config {
        /// The error message describing the configuration issue
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(fluentcore::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },
}

impl Error {
    /// Create a task not found error
    pub fn task_not_found(key: impl Into<String>) -> Self {
        Self::TaskNotFound { key: key.into() }
    }

    /// Create a missing root result error
    pub fn no_result(key: impl Into<String>) -> Self {
        Self::NoResult { key: key.into() }
    }

    /// Create an aggregated fault error
    #[must_use]
    pub fn faulted(faults: Vec<FaultKind>) -> Self {
        Self::Faulted { faults }
    }

    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(PathBuf::into_boxed_path),
            operation: operation.into(),
        }
    }

    /// The propagated faults, if this is an aggregated fault error.
    #[must_use]
    pub fn faults(&self) -> &[FaultKind] {
        match self {
            Self::Faulted { faults } => faults,
            _ => &[],
        }
    }
}

/// Result type for task group operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a task did not produce a result.
///
/// Only [`FaultKind::User`] reaches the caller; the other kinds are derived
/// from it and are filtered out of the aggregated error.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum FaultKind {
    /// The task's own work failed
    #[error("Task '{key}' failed: {source}")]
    #[diagnostic(code(fluentcore::task::failed))]
    User {
        /// Key of the failed task
        key: String,
        /// The error raised by the task
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The task was never started because the group was cancelled
    #[error("Task '{key}' was cancelled")]
    #[diagnostic(code(fluentcore::task::cancelled))]
    Cancelled {
        /// Key of the cancelled task
        key: String,
    },

    /// The task was never started because a dependency faulted
    #[error("Task '{key}' did not run because a dependency faulted")]
    #[diagnostic(code(fluentcore::task::dependency_faulted))]
    DependencyFaulted {
        /// Key of the suppressed task
        key: String,
    },
}

impl FaultKind {
    /// Wrap an error raised by task code
    pub fn user(key: impl Into<String>, source: BoxError) -> Self {
        Self::User {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Key of the task this fault belongs to
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::User { key, .. } | Self::Cancelled { key } | Self::DependencyFaulted { key } => key,
        }
    }

    /// Whether this fault is reported to the caller
    #[must_use]
    pub const fn is_propagated(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Short name used in structured events
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Cancelled { .. } => "cancelled",
            Self::DependencyFaulted { .. } => "dependency_faulted",
        }
    }
}

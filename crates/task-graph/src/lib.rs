//! Directed dependency graphs with wave-by-wave enumeration for fluentcore.
//!
//! This crate provides the graph layer underneath task groups: shared graph
//! entries, dependency graphs that merge each other's node tables, and a
//! Kahn-style enumerator that releases nodes as their dependencies report in.
//!
//! # Key Types
//!
//! - [`GraphEntry`]: A node shared between graphs, carrying a payload, its
//!   dependency edges, an optional forwarding link and a cached result
//! - [`DirectedGraph`]: A graph rooted at one entry, with enumeration state
//! - [`ValidationResult`]: Outcome of structural validation
//!
//! # Forwarding
//!
//! An entry can forward to another entry. Ordinary dependency edges that
//! target a forwarding entry land on the forward target instead, while
//! pinned edges always land on the entry they were created with. This is
//! how a node is transparently replaced by a stand-in for every existing
//! and future dependent.
//!
//! # Example
//!
//! ```
//! use fluentcore_task_graph::{DirectedGraph, GraphEntry};
//! use std::sync::Arc;
//!
//! let build: DirectedGraph<(), ()> = DirectedGraph::new(Arc::new(GraphEntry::new("build", ())));
//! let mut test = DirectedGraph::new(Arc::new(GraphEntry::new("test", ())));
//! test.add_dependency_graph(&build)?;
//!
//! test.prepare_for_enumeration()?;
//! let first = test.next().map(|entry| entry.key().to_string());
//! assert_eq!(first.as_deref(), Some("build"));
//! # Ok::<(), fluentcore_task_graph::Error>(())
//! ```

mod entry;
mod error;
mod graph;
mod validation;

pub use entry::GraphEntry;
pub use error::{Error, Result};
pub use graph::DirectedGraph;
pub use validation::ValidationResult;

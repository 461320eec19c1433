//! Validation utilities for directed graphs.
//!
//! These run petgraph's algorithms over the resolved adjacency captured by
//! the last [`DirectedGraph::refresh`].

use crate::{DirectedGraph, Error, Result};
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Result of graph validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the graph is valid (no cycles, no missing dependencies).
    pub is_valid: bool,
    /// List of validation errors, if any.
    pub errors: Vec<Error>,
}

impl ValidationResult {
    /// Create a valid result.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    /// Create an invalid result with errors.
    #[must_use]
    pub fn invalid(errors: Vec<Error>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }
}

impl<T, R> DirectedGraph<T, R> {
    /// Edges run from dependency to dependent.
    fn to_petgraph(&self) -> (DiGraph<&str, ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();

        for key in self.dependency_map().keys() {
            indices.insert(key.as_str(), graph.add_node(key.as_str()));
        }
        for (key, deps) in self.dependency_map() {
            for dep in deps {
                if let (Some(&from), Some(&to)) = (indices.get(dep.as_str()), indices.get(key.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }

        (graph, indices)
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        let (graph, _) = self.to_petgraph();
        is_cyclic_directed(&graph)
    }

    /// Find one dependency cycle, listed in dependency order with the first
    /// key repeated at the end.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let (graph, _) = self.to_petgraph();

        tarjan_scc(&graph).into_iter().find_map(|component| {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| graph.contains_edge(idx, idx));
            if !is_cycle {
                return None;
            }
            let members: BTreeSet<&str> = component.iter().map(|&idx| graph[idx]).collect();
            Some(self.cycle_through(&members))
        })
    }

    fn cycle_through(&self, members: &BTreeSet<&str>) -> Vec<String> {
        let deps = self.dependency_map();
        let Some(&start) = members.iter().next() else {
            return vec![];
        };

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for dep in deps.get(current).into_iter().flatten() {
                let dep = dep.as_str();
                if !members.contains(dep) {
                    continue;
                }
                if dep == start {
                    let mut path = vec![start.to_string()];
                    let mut node = current;
                    while node != start {
                        path.push(node.to_string());
                        match parents.get(node) {
                            Some(&parent) => node = parent,
                            None => break,
                        }
                    }
                    path.push(start.to_string());
                    path.reverse();
                    return path;
                }
                if !parents.contains_key(dep) {
                    parents.insert(dep, current);
                    queue.push_back(dep);
                }
            }
        }

        members.iter().map(|key| (*key).to_string()).collect()
    }

    /// Node keys in an order where every dependency precedes its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph contains cycles.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let (graph, _) = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx].to_string()).collect()),
            Err(cycle) => Err(Error::CycleDetected {
                cycle: self
                    .find_cycle()
                    .unwrap_or_else(|| vec![graph[cycle.node_id()].to_string()]),
            }),
        }
    }

    /// Validate the graph structure.
    ///
    /// Checks for:
    /// - Cycles in the dependency graph
    /// - Dependencies missing from the node table
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if let Some(cycle) = self.find_cycle() {
            errors.push(Error::CycleDetected { cycle });
        }
        for deps in self.dependency_map().values() {
            for dep in deps {
                if !self.contains(dep) {
                    errors.push(Error::node_not_found(dep.clone()));
                }
            }
        }

        if errors.is_empty() {
            ValidationResult::valid()
        } else {
            ValidationResult::invalid(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GraphEntry;
    use std::sync::Arc;

    type Graph = DirectedGraph<(), ()>;

    fn node(key: &str) -> Graph {
        DirectedGraph::new(Arc::new(GraphEntry::new(key, ())))
    }

    #[test]
    fn test_validate_single_node_graph() {
        let graph = node("a");
        let result = graph.validate();
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_validate_valid_graph() {
        let a = node("a");
        let mut b = node("b");
        b.add_dependency_graph(&a).unwrap();

        let result = b.validate();
        assert!(result.is_valid);
        assert_eq!(b.topological_order().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_through_raw_edges() {
        // Insertion-time checks are bypassed by wiring entries directly
        let mut a = node("a");
        let b = node("b");
        a.root().add_dependency(b.root());
        b.root().add_dependency(a.root());
        a.refresh().unwrap();

        assert!(a.has_cycles());
        assert_eq!(
            a.find_cycle(),
            Some(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );

        let result = a.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(
            a.topological_order(),
            Err(Error::CycleDetected { .. })
        ));
        assert!(matches!(
            a.prepare_for_enumeration(),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut a = node("a");
        a.root().add_dependency(a.root());
        a.refresh().unwrap();

        assert_eq!(
            a.find_cycle(),
            Some(vec!["a".to_string(), "a".to_string()])
        );
    }
}

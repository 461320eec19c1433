//! Graph entries.
//!
//! A [`GraphEntry`] is shared (behind an [`Arc`]) by every graph that merged
//! it, so its edges and result slot use interior mutability. Adjacency is
//! recorded on the dependent side only; dependent sets are derived per graph
//! when the graph is refreshed.

use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A node in a [`DirectedGraph`](crate::DirectedGraph).
///
/// `T` is the payload and `R` the type of the cached result.
pub struct GraphEntry<T, R> {
    key: String,
    data: T,
    links: Mutex<Links<T, R>>,
    result: Mutex<Option<R>>,
}

struct Links<T, R> {
    dependencies: BTreeMap<String, Edge<T, R>>,
    forward: Option<Arc<GraphEntry<T, R>>>,
}

/// How a dependency edge reaches its target.
enum Edge<T, R> {
    /// Lands on whatever the target currently forwards to.
    Follow(Arc<GraphEntry<T, R>>),
    /// Always lands on the target itself. Held weakly: pinned edges point
    /// back at an entry whose forwarding target owns the edge holder.
    Pinned(Weak<GraphEntry<T, R>>),
}

impl<T, R> Clone for Edge<T, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Follow(target) => Self::Follow(Arc::clone(target)),
            Self::Pinned(target) => Self::Pinned(Weak::clone(target)),
        }
    }
}

impl<T, R> GraphEntry<T, R> {
    /// Create a new entry with no dependencies and an empty result slot.
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            key: key.into(),
            data,
            links: Mutex::new(Links {
                dependencies: BTreeMap::new(),
                forward: None,
            }),
            result: Mutex::new(None),
        }
    }

    /// The unique key of this entry.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The payload of this entry.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    fn links(&self) -> MutexGuard<'_, Links<T, R>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn result_slot(&self) -> MutexGuard<'_, Option<R>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys of the entries this entry directly depends on, as declared.
    ///
    /// Forwarding is not applied here; see
    /// [`resolved_dependencies`](Self::resolved_dependencies).
    #[must_use]
    pub fn dependency_keys(&self) -> Vec<String> {
        self.links().dependencies.keys().cloned().collect()
    }

    /// Whether a dependency on `key` has been declared.
    #[must_use]
    pub fn has_dependency(&self, key: &str) -> bool {
        self.links().dependencies.contains_key(key)
    }

    /// Declare a dependency that follows the target's forwarding link.
    pub fn add_dependency(&self, dependency: &Arc<Self>) {
        self.links()
            .dependencies
            .insert(dependency.key.clone(), Edge::Follow(Arc::clone(dependency)));
    }

    /// Declare a dependency that always lands on `dependency` itself.
    pub fn add_pinned_dependency(&self, dependency: &Arc<Self>) {
        self.links().dependencies.insert(
            dependency.key.clone(),
            Edge::Pinned(Arc::downgrade(dependency)),
        );
    }

    /// Remove the dependency on `key`. Returns whether it was present.
    pub fn remove_dependency(&self, key: &str) -> bool {
        self.links().dependencies.remove(key).is_some()
    }

    /// Route every follow edge that targets this entry to `target` instead.
    pub fn forward_to(&self, target: &Arc<Self>) {
        self.links().forward = Some(Arc::clone(target));
    }

    /// The entry follow edges are currently routed to, if any.
    #[must_use]
    pub fn forwarded(&self) -> Option<Arc<Self>> {
        self.links().forward.clone()
    }

    /// Whether this entry forwards follow edges elsewhere.
    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        self.links().forward.is_some()
    }

    /// Follow the forwarding chain starting at this entry.
    #[must_use]
    pub fn resolve(self: &Arc<Self>) -> Arc<Self> {
        let mut current = Arc::clone(self);
        let mut seen = HashSet::new();
        while let Some(next) = current.forwarded() {
            if !seen.insert(current.key.clone()) {
                break;
            }
            current = next;
        }
        current
    }

    /// The entries this entry depends on once edges are resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingDependency`] if a pinned target has been dropped.
    pub fn resolved_dependencies(&self) -> Result<Vec<Arc<Self>>> {
        let edges: Vec<(String, Edge<T, R>)> = self
            .links()
            .dependencies
            .iter()
            .map(|(key, edge)| (key.clone(), edge.clone()))
            .collect();

        edges
            .into_iter()
            .map(|(key, edge)| match edge {
                Edge::Follow(target) => Ok(target.resolve()),
                Edge::Pinned(target) => target.upgrade().ok_or_else(|| Error::DanglingDependency {
                    node: self.key.clone(),
                    dependency: key,
                }),
            })
            .collect()
    }

    /// Store a result, returning the previous one.
    pub fn set_result(&self, result: R) -> Option<R> {
        self.result_slot().replace(result)
    }

    /// Drop the cached result.
    pub fn clear_result(&self) {
        self.result_slot().take();
    }

    /// Whether a result has been cached.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result_slot().is_some()
    }
}

impl<T, R: Clone> GraphEntry<T, R> {
    /// The cached result, if the entry has produced one.
    #[must_use]
    pub fn result(&self) -> Option<R> {
        self.result_slot().clone()
    }
}

impl<T, R> fmt::Debug for GraphEntry<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links = self.links();
        f.debug_struct("GraphEntry")
            .field("key", &self.key)
            .field("dependencies", &links.dependencies.keys().collect::<Vec<_>>())
            .field("forward", &links.forward.as_ref().map(|entry| entry.key.as_str()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Entry = GraphEntry<(), u32>;

    fn entry(key: &str) -> Arc<Entry> {
        Arc::new(GraphEntry::new(key, ()))
    }

    #[test]
    fn test_dependency_bookkeeping() {
        let a = entry("a");
        let b = entry("b");

        b.add_dependency(&a);
        assert!(b.has_dependency("a"));
        assert_eq!(b.dependency_keys(), vec!["a".to_string()]);

        assert!(b.remove_dependency("a"));
        assert!(!b.remove_dependency("a"));
        assert!(b.dependency_keys().is_empty());
    }

    #[test]
    fn test_follow_edge_resolves_through_forwarding() {
        let actual = entry("actual");
        let proxy = entry("proxy");
        let parent = entry("parent");

        parent.add_dependency(&actual);
        proxy.add_pinned_dependency(&actual);
        actual.forward_to(&proxy);

        let parent_deps = parent.resolved_dependencies().unwrap();
        assert_eq!(parent_deps.len(), 1);
        assert!(Arc::ptr_eq(&parent_deps[0], &proxy));

        let proxy_deps = proxy.resolved_dependencies().unwrap();
        assert!(Arc::ptr_eq(&proxy_deps[0], &actual));
    }

    #[test]
    fn test_pinned_edge_to_dropped_entry_is_dangling() {
        let holder = entry("holder");
        {
            let gone = entry("gone");
            holder.add_pinned_dependency(&gone);
        }

        let err = holder.resolved_dependencies().unwrap_err();
        assert_eq!(
            err,
            Error::DanglingDependency {
                node: "holder".to_string(),
                dependency: "gone".to_string(),
            }
        );
    }

    #[test]
    fn test_resolve_terminates_on_forwarding_loop() {
        let a = entry("a");
        let b = entry("b");
        a.forward_to(&b);
        b.forward_to(&a);

        // Must not spin forever; which end it stops on is irrelevant.
        let resolved = a.resolve();
        assert!(resolved.key() == "a" || resolved.key() == "b");
    }

    #[test]
    fn test_result_slot() {
        let a = entry("a");
        assert!(!a.has_result());
        assert_eq!(a.set_result(7), None);
        assert_eq!(a.set_result(8), Some(7));
        assert_eq!(a.result(), Some(8));
        a.clear_result();
        assert_eq!(a.result(), None);
    }
}

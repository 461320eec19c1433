//! Directed graph of shared entries with Kahn-style enumeration.
//!
//! A [`DirectedGraph`] is a view rooted at one [`GraphEntry`]. Merging another
//! graph as a dependency copies its node table while sharing the entries, so
//! the root graph of a composition knows about every node beneath it.
//!
//! Enumeration hands out nodes whose dependencies have all been reported. A
//! caller drains [`DirectedGraph::next`], runs the returned nodes, and reports
//! each outcome with [`DirectedGraph::report_completion`] or
//! [`DirectedGraph::report_error`], which releases the next wave.

use crate::{Error, GraphEntry, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type Table<T, R> = HashMap<String, Arc<GraphEntry<T, R>>>;
type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// A dependency graph rooted at a single entry.
///
/// The node table is a snapshot. Edges added to shared entries after a merge
/// are picked up by [`refresh`](Self::refresh), which
/// [`prepare_for_enumeration`](Self::prepare_for_enumeration) always runs.
pub struct DirectedGraph<T, R> {
    root: Arc<GraphEntry<T, R>>,
    nodes: Table<T, R>,
    /// Resolved dependency keys per node.
    dependencies: Adjacency,
    /// Inverse of `dependencies`.
    dependents: Adjacency,
    // Enumeration state, reset by `prepare_for_enumeration`.
    unresolved: HashMap<String, usize>,
    reported: HashSet<String>,
    faulted: HashSet<String>,
    ready: VecDeque<String>,
}

impl<T, R> Clone for DirectedGraph<T, R> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            nodes: self.nodes.clone(),
            dependencies: self.dependencies.clone(),
            dependents: self.dependents.clone(),
            unresolved: self.unresolved.clone(),
            reported: self.reported.clone(),
            faulted: self.faulted.clone(),
            ready: self.ready.clone(),
        }
    }
}

impl<T, R> DirectedGraph<T, R> {
    /// Create a graph whose table holds only `root`.
    ///
    /// Edges the root already carries are discovered on the next
    /// [`refresh`](Self::refresh).
    pub fn new(root: Arc<GraphEntry<T, R>>) -> Self {
        let key = root.key().to_string();
        let mut nodes = HashMap::new();
        nodes.insert(key.clone(), Arc::clone(&root));

        Self {
            root,
            nodes,
            dependencies: BTreeMap::from([(key.clone(), BTreeSet::new())]),
            dependents: BTreeMap::from([(key, BTreeSet::new())]),
            unresolved: HashMap::new(),
            reported: HashSet::new(),
            faulted: HashSet::new(),
            ready: VecDeque::new(),
        }
    }

    /// The root entry of this graph.
    #[must_use]
    pub fn root(&self) -> &Arc<GraphEntry<T, R>> {
        &self.root
    }

    /// Key of the root entry.
    #[must_use]
    pub fn key(&self) -> &str {
        self.root.key()
    }

    /// Whether `entry` is this graph's root.
    #[must_use]
    pub fn is_root(&self, entry: &Arc<GraphEntry<T, R>>) -> bool {
        Arc::ptr_eq(&self.root, entry)
    }

    /// Number of nodes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false once constructed, the root is part of the table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if the table contains a node with `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Get a node from the table.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<GraphEntry<T, R>>> {
        self.nodes.get(key)
    }

    /// Iterate over all nodes in the table, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<GraphEntry<T, R>>> {
        self.nodes.values()
    }

    /// Look up a node by walking live edges when the table does not know it yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk hits a dangling pinned edge or two
    /// different entries sharing a key.
    pub fn find(&self, key: &str) -> Result<Option<Arc<GraphEntry<T, R>>>> {
        if let Some(entry) = self.nodes.get(key) {
            return Ok(Some(Arc::clone(entry)));
        }
        let (nodes, _) = closure(self.seeds())?;
        Ok(nodes.get(key).cloned())
    }

    /// Add a standalone node to the table.
    ///
    /// Adding the same entry twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if a different entry already uses the key.
    pub fn add_node(&mut self, entry: Arc<GraphEntry<T, R>>) -> Result<()> {
        if let Some(existing) = self.nodes.get(entry.key()) {
            if Arc::ptr_eq(existing, &entry) {
                return Ok(());
            }
            return Err(Error::duplicate_key(entry.key()));
        }

        let key = entry.key().to_string();
        self.dependencies.entry(key.clone()).or_default();
        self.dependents.entry(key.clone()).or_default();
        self.nodes.insert(key, entry);
        Ok(())
    }

    /// Make this graph's root depend on `other`'s root and merge `other`'s nodes.
    ///
    /// The edge follows the dependency's forwarding link, so it lands on
    /// whatever the dependency's root currently routes to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelfDependency`] if both graphs share a root, or
    /// [`Error::CycleDetected`] if `other` already reaches this root.
    pub fn add_dependency_graph(&mut self, other: &Self) -> Result<()> {
        self.link(other, false)
    }

    /// Like [`add_dependency_graph`](Self::add_dependency_graph), but the edge
    /// always lands on `other`'s root itself, ignoring forwarding.
    ///
    /// # Errors
    ///
    /// Same as [`add_dependency_graph`](Self::add_dependency_graph).
    pub fn add_pinned_dependency_graph(&mut self, other: &Self) -> Result<()> {
        self.link(other, true)
    }

    fn link(&mut self, other: &Self, pinned: bool) -> Result<()> {
        let key = self.key().to_string();
        let target = if pinned {
            Arc::clone(&other.root)
        } else {
            other.root.resolve()
        };

        if target.key() == key {
            return Err(Error::SelfDependency { key });
        }
        if let Some(path) = path_between(&target, &key)? {
            let mut cycle = vec![key];
            cycle.extend(path);
            return Err(Error::CycleDetected { cycle });
        }

        for (node_key, node) in &other.nodes {
            if self.nodes.contains_key(node_key) {
                continue;
            }
            self.nodes.insert(node_key.clone(), Arc::clone(node));
            let deps = other.dependencies.get(node_key).cloned().unwrap_or_default();
            for dep in &deps {
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(node_key.clone());
            }
            self.dependencies.insert(node_key.clone(), deps);
            self.dependents.entry(node_key.clone()).or_default();
        }

        if pinned {
            self.root.add_pinned_dependency(&other.root);
        } else {
            self.root.add_dependency(&other.root);
        }

        // A forwarding target may live outside `other`'s table.
        let target_key = target.key().to_string();
        if !self.nodes.contains_key(&target_key) {
            self.nodes.insert(target_key.clone(), target);
            self.dependencies.entry(target_key.clone()).or_default();
        }
        self.dependencies
            .entry(key.clone())
            .or_default()
            .insert(target_key.clone());
        self.dependents
            .entry(target_key.clone())
            .or_default()
            .insert(key.clone());

        debug!(
            "Graph '{}' now depends on '{}'{}",
            key,
            target_key,
            if pinned { " (pinned)" } else { "" }
        );
        Ok(())
    }

    /// Rebuild the node table and adjacency from live edges.
    ///
    /// The walk starts at the root and at every node already in the table, so
    /// the table only grows.
    ///
    /// # Errors
    ///
    /// Returns an error on a dangling pinned edge or a key shared by two
    /// different entries.
    pub fn refresh(&mut self) -> Result<()> {
        let (nodes, dependencies) = closure(self.seeds())?;

        let mut dependents: Adjacency = nodes
            .keys()
            .map(|key| (key.clone(), BTreeSet::new()))
            .collect();
        for (key, deps) in &dependencies {
            for dep in deps {
                dependents.entry(dep.clone()).or_default().insert(key.clone());
            }
        }

        trace!(
            "Refreshed graph '{}': {} nodes",
            self.root.key(),
            nodes.len()
        );

        self.nodes = nodes;
        self.dependencies = dependencies;
        self.dependents = dependents;
        Ok(())
    }

    fn seeds(&self) -> Vec<Arc<GraphEntry<T, R>>> {
        let mut seeds: Vec<_> = self.nodes.values().cloned().collect();
        seeds.push(Arc::clone(&self.root));
        seeds
    }

    /// Refresh the graph and reset enumeration state.
    ///
    /// After this call, [`next`](Self::next) yields every node without
    /// dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the refreshed graph is cyclic, or
    /// any error from [`refresh`](Self::refresh).
    pub fn prepare_for_enumeration(&mut self) -> Result<()> {
        self.refresh()?;
        if let Some(cycle) = self.find_cycle() {
            return Err(Error::CycleDetected { cycle });
        }

        self.unresolved = self
            .dependencies
            .iter()
            .map(|(key, deps)| (key.clone(), deps.len()))
            .collect();
        self.reported.clear();
        self.faulted.clear();
        self.ready = self
            .dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(key, _)| key.clone())
            .collect();

        debug!(
            "Prepared graph '{}' for enumeration: {} nodes, {} ready",
            self.root.key(),
            self.nodes.len(),
            self.ready.len()
        );
        Ok(())
    }

    /// Take the next node whose dependencies have all been reported.
    ///
    /// Returns `None` when nothing is ready right now. More nodes may become
    /// ready after further reports.
    pub fn next(&mut self) -> Option<Arc<GraphEntry<T, R>>> {
        while let Some(key) = self.ready.pop_front() {
            if let Some(entry) = self.nodes.get(&key) {
                return Some(Arc::clone(entry));
            }
        }
        None
    }

    /// Report that the node `key` completed successfully.
    pub fn report_completion(&mut self, key: &str) {
        self.settle(key, false);
    }

    /// Report that the node `key` failed. Its dependents are marked faulted
    /// but still released, so callers can settle them in turn.
    pub fn report_error(&mut self, key: &str) {
        self.settle(key, true);
    }

    fn settle(&mut self, key: &str, faulted: bool) {
        if !self.reported.insert(key.to_string()) {
            trace!("Node '{}' already reported", key);
            return;
        }
        let Some(dependents) = self.dependents.get(key).cloned() else {
            return;
        };

        for dependent in dependents {
            if faulted {
                self.faulted.insert(dependent.clone());
            }
            if let Some(count) = self.unresolved.get_mut(&dependent)
                && *count > 0
            {
                *count -= 1;
                if *count == 0 {
                    self.ready.push_back(dependent);
                }
            }
        }
    }

    /// Whether any dependency of `key` reported an error.
    #[must_use]
    pub fn has_faulted_dependency(&self, key: &str) -> bool {
        self.faulted.contains(key)
    }

    /// Resolved dependency keys of `key`, as of the last refresh.
    #[must_use]
    pub fn dependency_keys(&self, key: &str) -> Vec<String> {
        self.dependencies
            .get(key)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of the nodes depending on `key`, as of the last refresh.
    #[must_use]
    pub fn dependent_keys(&self, key: &str) -> Vec<String> {
        self.dependents
            .get(key)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn dependency_map(&self) -> &Adjacency {
        &self.dependencies
    }
}

impl<T, R> fmt::Debug for DirectedGraph<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectedGraph")
            .field("root", &self.root.key())
            .field("dependencies", &self.dependencies)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

/// Walk resolved edges from `seeds`, collecting every reachable entry.
fn closure<T, R>(seeds: Vec<Arc<GraphEntry<T, R>>>) -> Result<(Table<T, R>, Adjacency)> {
    let mut nodes: Table<T, R> = HashMap::new();
    let mut dependencies = BTreeMap::new();
    let mut stack = seeds;

    while let Some(entry) = stack.pop() {
        if let Some(existing) = nodes.get(entry.key()) {
            if Arc::ptr_eq(existing, &entry) {
                continue;
            }
            return Err(Error::duplicate_key(entry.key()));
        }

        let resolved = entry.resolved_dependencies()?;
        let key = entry.key().to_string();
        dependencies.insert(
            key.clone(),
            resolved.iter().map(|dep| dep.key().to_string()).collect(),
        );
        nodes.insert(key, entry);
        stack.extend(resolved);
    }

    Ok((nodes, dependencies))
}

/// Shortest chain of dependency keys from `from` to the entry keyed `to`.
fn path_between<T, R>(from: &Arc<GraphEntry<T, R>>, to: &str) -> Result<Option<Vec<String>>> {
    let mut parents: HashMap<String, String> = HashMap::new();
    let mut visited = HashSet::from([from.key().to_string()]);
    let mut queue = VecDeque::from([Arc::clone(from)]);

    while let Some(entry) = queue.pop_front() {
        if entry.key() == to {
            let mut path = vec![to.to_string()];
            let mut current = to;
            while let Some(parent) = parents.get(current) {
                path.push(parent.clone());
                current = parent;
            }
            path.reverse();
            return Ok(Some(path));
        }
        for dep in entry.resolved_dependencies()? {
            if visited.insert(dep.key().to_string()) {
                parents.insert(dep.key().to_string(), entry.key().to_string());
                queue.push_back(dep);
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Graph = DirectedGraph<(), u32>;

    fn node(key: &str) -> Graph {
        DirectedGraph::new(Arc::new(GraphEntry::new(key, ())))
    }

    fn drain(graph: &mut Graph) -> Vec<String> {
        let mut order = Vec::new();
        while let Some(entry) = graph.next() {
            order.push(entry.key().to_string());
        }
        order
    }

    #[test]
    fn test_new_graph_holds_root() {
        let graph = node("a");
        assert_eq!(graph.len(), 1);
        assert!(!graph.is_empty());
        assert!(graph.contains("a"));
        assert_eq!(graph.key(), "a");
    }

    #[test]
    fn test_add_node_duplicate_key() {
        let mut graph = node("a");
        let other = Arc::new(GraphEntry::new("b", ()));
        graph.add_node(Arc::clone(&other)).unwrap();
        // Same entry again is fine
        graph.add_node(Arc::clone(&other)).unwrap();

        let imposter = Arc::new(GraphEntry::new("b", ()));
        assert_eq!(graph.add_node(imposter), Err(Error::duplicate_key("b")));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut a = node("a");
        let same = a.clone();
        assert_eq!(
            a.add_dependency_graph(&same),
            Err(Error::SelfDependency {
                key: "a".to_string()
            })
        );
    }

    #[test]
    fn test_cycle_rejected_at_insertion() {
        let mut a = node("a");
        let mut b = node("b");
        b.add_dependency_graph(&a).unwrap();

        let err = a.add_dependency_graph(&b).unwrap_err();
        assert_eq!(
            err,
            Error::CycleDetected {
                cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }
        );
    }

    #[test]
    fn test_merge_copies_node_table() {
        let mut a = node("a");
        let b = node("b");
        let mut c = node("c");

        a.add_dependency_graph(&b).unwrap();
        c.add_dependency_graph(&a).unwrap();

        assert_eq!(c.len(), 3);
        assert_eq!(c.dependency_keys("c"), vec!["a"]);
        assert_eq!(c.dependency_keys("a"), vec!["b"]);
        assert_eq!(c.dependent_keys("b"), vec!["a"]);
    }

    #[test]
    fn test_enumeration_in_waves() {
        // Create a diamond: d depends on b and c, both depend on a
        let a = node("a");
        let mut b = node("b");
        let mut c = node("c");
        let mut d = node("d");
        b.add_dependency_graph(&a).unwrap();
        c.add_dependency_graph(&a).unwrap();
        d.add_dependency_graph(&b).unwrap();
        d.add_dependency_graph(&c).unwrap();

        d.prepare_for_enumeration().unwrap();
        assert_eq!(drain(&mut d), vec!["a"]);

        d.report_completion("a");
        assert_eq!(drain(&mut d), vec!["b", "c"]);

        d.report_completion("b");
        assert!(d.next().is_none());

        d.report_completion("c");
        assert_eq!(drain(&mut d), vec!["d"]);
    }

    #[test]
    fn test_double_report_is_ignored() {
        let a = node("a");
        let b = node("b");
        let mut c = node("c");
        c.add_dependency_graph(&a).unwrap();
        c.add_dependency_graph(&b).unwrap();

        c.prepare_for_enumeration().unwrap();
        assert_eq!(drain(&mut c), vec!["a", "b"]);

        c.report_completion("a");
        c.report_completion("a");
        assert!(c.next().is_none());
    }

    #[test]
    fn test_report_error_marks_dependents_faulted() {
        let a = node("a");
        let mut b = node("b");
        let mut c = node("c");
        b.add_dependency_graph(&a).unwrap();
        c.add_dependency_graph(&b).unwrap();

        c.prepare_for_enumeration().unwrap();
        drain(&mut c);
        c.report_error("a");

        assert!(c.has_faulted_dependency("b"));
        assert!(!c.has_faulted_dependency("c"));
        assert_eq!(drain(&mut c), vec!["b"]);
    }

    #[test]
    fn test_refresh_picks_up_late_edges() {
        let a = node("a");
        let mut b = node("b");
        let mut c = node("c");
        c.add_dependency_graph(&b).unwrap();

        // b learns about a only after c merged b's table
        b.add_dependency_graph(&a).unwrap();
        assert!(!c.contains("a"));

        c.refresh().unwrap();
        assert!(c.contains("a"));
        assert_eq!(c.dependency_keys("b"), vec!["a"]);
    }

    #[test]
    fn test_follow_edge_lands_on_forward_target() {
        let x = node("x");
        let mut parent = node("parent");
        parent.add_dependency_graph(&x).unwrap();

        let mut proxy = node("proxy-x");
        proxy.add_pinned_dependency_graph(&x).unwrap();
        x.root().forward_to(proxy.root());

        parent.prepare_for_enumeration().unwrap();
        assert_eq!(parent.dependency_keys("parent"), vec!["proxy-x"]);
        assert_eq!(parent.dependency_keys("proxy-x"), vec!["x"]);
        assert_eq!(drain(&mut parent), vec!["x"]);
    }

    #[test]
    fn test_find_walks_live_edges() {
        let a = node("a");
        let mut b = node("b");
        let c = {
            let mut c = node("c");
            c.add_dependency_graph(&b).unwrap();
            c
        };
        b.add_dependency_graph(&a).unwrap();

        assert!(!c.contains("a"));
        let found = c.find("a").unwrap().unwrap();
        assert_eq!(found.key(), "a");
        assert!(c.find("missing").unwrap().is_none());
    }
}

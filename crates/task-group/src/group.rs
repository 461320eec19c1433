//! Task groups: graphs of task items with one invocation lifecycle.

use crate::entry::{EntryTask, TaskGroupEntry, TaskGroupEntryExt};
use crate::functional::{FunctionalContext, FunctionalTaskItem};
use crate::invoke::Invocation;
use crate::{Error, Indexable, InvocationContext, ProxyTaskGroupWrapper, Result, TaskItem, TaskResult};
use fluentcore_task_graph::{DirectedGraph, GraphEntry};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;

/// A dependency graph of task items rooted at one task.
///
/// Cloning a group is cheap and yields another handle onto the same entries.
/// Edges added through any handle are seen by every group that reaches the
/// affected entries.
#[derive(Clone, Debug)]
pub struct TaskGroup {
    graph: DirectedGraph<EntryTask, Indexable>,
}

impl TaskGroup {
    /// Create a group whose root runs `item`.
    pub fn new(key: impl Into<String>, item: impl TaskItem) -> Self {
        Self::from_item(key, Arc::new(item))
    }

    /// Create a group from an already shared task item.
    pub fn from_item(key: impl Into<String>, item: Arc<dyn TaskItem>) -> Self {
        let entry = Arc::new(GraphEntry::new(key, EntryTask::Item(item)));
        Self {
            graph: DirectedGraph::new(entry),
        }
    }

    /// A group rooted at an existing entry, with its table walked from the
    /// entry's edges.
    pub(crate) fn from_entry(entry: Arc<TaskGroupEntry>) -> Result<Self> {
        let mut graph = DirectedGraph::new(entry);
        graph.refresh()?;
        Ok(Self { graph })
    }

    /// A group rooted at `entry` whose table holds only the entry. Edges
    /// added through it still land on the shared entries.
    pub(crate) fn view(entry: Arc<TaskGroupEntry>) -> Self {
        Self {
            graph: DirectedGraph::new(entry),
        }
    }

    pub(crate) fn graph(&self) -> &DirectedGraph<EntryTask, Indexable> {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut DirectedGraph<EntryTask, Indexable> {
        &mut self.graph
    }

    /// Key of the root task.
    #[must_use]
    pub fn key(&self) -> &str {
        self.graph.key()
    }

    /// The root entry.
    #[must_use]
    pub fn root(&self) -> &Arc<TaskGroupEntry> {
        self.graph.root()
    }

    /// Make this group depend on `dependency`.
    ///
    /// If `dependency` has post-run dependents, this group waits for them as
    /// well. Returns the dependency's key.
    ///
    /// # Errors
    ///
    /// Returns a graph error if the edge would create a cycle.
    pub fn add_dependency_task_group(&mut self, dependency: &Self) -> Result<String> {
        ProxyTaskGroupWrapper::new(dependency).add_dependent_task_group(self)?;
        Ok(dependency.key().to_string())
    }

    /// Make this group depend on a new task. Returns the task's key.
    ///
    /// # Errors
    ///
    /// Returns a graph error if the key is already used by this group's root.
    pub fn add_dependency(&mut self, key: impl Into<String>, item: impl TaskItem) -> Result<String> {
        self.add_dependency_task_group(&Self::new(key, item))
    }

    /// Make this group depend on a closure-backed task with a generated key.
    /// Returns the generated key.
    ///
    /// # Errors
    ///
    /// Same as [`add_dependency`](Self::add_dependency).
    pub fn add_dependency_fn<F, Fut>(&mut self, func: F) -> Result<String>
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let item = FunctionalTaskItem::new(func);
        let key = item.key().to_string();
        self.add_dependency(key, item)
    }

    /// Make `dependent` depend on this group.
    ///
    /// # Errors
    ///
    /// Returns a graph error if the edge would create a cycle.
    pub fn add_dependent_task_group(&self, dependent: &mut Self) -> Result<()> {
        ProxyTaskGroupWrapper::new(self).add_dependent_task_group(dependent)
    }

    /// Register `dependent` to run after this group's root task.
    ///
    /// Every invocation that reaches this group, directly or through a
    /// dependent group, also runs `dependent` and waits for it. Returns the
    /// dependent's key.
    ///
    /// # Errors
    ///
    /// Returns a graph error if `dependent` is already a dependency of this
    /// group.
    pub fn add_post_run_dependent_task_group(&self, dependent: &mut Self) -> Result<String> {
        ProxyTaskGroupWrapper::new(self).add_post_run_task_group_for_actual_task_group(dependent)?;
        Ok(dependent.key().to_string())
    }

    /// Register a new task to run after this group's root task. Returns the
    /// task's key.
    ///
    /// # Errors
    ///
    /// Same as [`add_post_run_dependent_task_group`](Self::add_post_run_dependent_task_group).
    pub fn add_post_run_dependent(&self, key: impl Into<String>, item: impl TaskItem) -> Result<String> {
        self.add_post_run_dependent_task_group(&mut Self::new(key, item))
    }

    /// Register a closure-backed task to run after this group's root task.
    /// Returns the generated key.
    ///
    /// # Errors
    ///
    /// Same as [`add_post_run_dependent_task_group`](Self::add_post_run_dependent_task_group).
    pub fn add_post_run_dependent_fn<F, Fut>(&self, func: F) -> Result<String>
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let item = FunctionalTaskItem::new(func);
        let key = item.key().to_string();
        self.add_post_run_dependent(key, item)
    }

    /// Whether post-run dependents have been registered on this group.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        ProxyTaskGroupWrapper::new(self).is_active()
    }

    /// The proxy group standing in for this group, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy graph cannot be walked.
    pub fn proxy_group(&self) -> Result<Option<Self>> {
        ProxyTaskGroupWrapper::new(self).task_group()
    }

    /// The result of task `key`, if it has produced one.
    ///
    /// Tasks reached only through this group's proxy are found as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if no task with `key` is reachable.
    pub fn task_result(&self, key: &str) -> Result<Option<Indexable>> {
        let entry = match self.graph.find(key)? {
            Some(entry) => Some(entry),
            None => match self.proxy_group()? {
                Some(proxy) => proxy.graph.find(key)?,
                None => None,
            },
        };
        entry
            .map(|entry| entry.task_result())
            .ok_or_else(|| Error::task_not_found(key))
    }

    /// Every entry reachable from this group, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be walked.
    pub fn entries(&self) -> Result<Vec<Arc<TaskGroupEntry>>> {
        let mut graph = self.graph.clone();
        graph.refresh()?;
        let mut entries: Vec<_> = graph.nodes().cloned().collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(entries)
    }

    /// Whether a task with `key` is reachable from this group.
    ///
    /// # Errors
    ///
    /// Returns a graph error if the live walk finds a dangling edge or two
    /// different tasks sharing a key.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.graph.find(key)?.is_some())
    }

    /// Whether this group depends, directly or transitively, on `other`.
    ///
    /// # Errors
    ///
    /// Same as [`contains`](Self::contains).
    pub fn depends_on(&self, other: &Self) -> Result<bool> {
        if other.key() == self.key() {
            return Ok(false);
        }
        self.contains(other.key())
    }

    /// Drop every cached result, so the next invocation runs every task.
    ///
    /// Tasks that report a value through [`TaskItem::result`] are still
    /// treated as cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be walked.
    pub fn clear_results(&self) -> Result<()> {
        let root = self.root().resolve();
        let mut graph = if self.graph.is_root(&root) {
            self.graph.clone()
        } else {
            Self::from_entry(root)?.graph
        };
        graph.refresh()?;
        for entry in graph.nodes() {
            entry.clear_result();
        }
        Ok(())
    }

    /// Invoke the group, yielding results in completion order.
    ///
    /// Every task reachable from the root runs once, after its dependencies.
    /// If any task faults, the stream ends with a single
    /// [`Error::Faulted`] carrying the original faults, after every result
    /// from unaffected branches has been yielded. Preparation errors are
    /// yielded as the only item.
    ///
    /// Cold tasks are spawned onto the current tokio runtime when there is
    /// one. Under any other executor they are polled in place, like hot tasks.
    /// A panicking task becomes a fault of that task.
    pub fn invoke_stream(&self, context: InvocationContext) -> BoxStream<'static, Result<Indexable>> {
        Invocation::new(self.clone(), context).into_stream()
    }

    /// Invoke the group and return the root task's result.
    ///
    /// # Errors
    ///
    /// Returns the error that terminated the result stream, or
    /// [`Error::NoResult`] if the root was skipped without a cached value.
    #[tracing::instrument(
        name = "task_group_invoke",
        fields(root = %self.key()),
        skip(self, context)
    )]
    pub async fn invoke_async(&self, context: &InvocationContext) -> Result<Indexable> {
        let mut results = self.invoke_stream(context.clone());
        while let Some(result) = results.next().await {
            result?;
        }
        let root = self.root().resolve();
        root.task_result().ok_or_else(|| Error::no_result(root.key()))
    }

    /// Invoke the group and collect every yielded result.
    ///
    /// # Errors
    ///
    /// Returns the error that terminated the result stream.
    pub async fn invoke_collect(&self, context: &InvocationContext) -> Result<Vec<Indexable>> {
        let mut results = self.invoke_stream(context.clone());
        let mut collected = Vec::new();
        while let Some(result) = results.next().await {
            collected.push(result?);
        }
        Ok(collected)
    }
}

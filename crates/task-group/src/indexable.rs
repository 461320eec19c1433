//! Tasks that own their task group.
//!
//! Resource definitions are usually modelled as an [`IndexableTaskItem`]: the
//! definition's work plus the group rooted at it, so dependencies can be
//! declared on the definition directly.

use crate::functional::{FunctionalContext, FunctionalTaskItem};
use crate::{Indexable, InvocationContext, Result, TaskGroup, TaskItem, TaskResult};
use async_trait::async_trait;
use std::future::Future;
use uuid::Uuid;

/// Anything that owns a [`TaskGroup`].
pub trait HasTaskGroup {
    /// The owned group.
    fn task_group(&self) -> &TaskGroup;

    /// The owned group, mutably.
    fn task_group_mut(&mut self) -> &mut TaskGroup;
}

impl HasTaskGroup for TaskGroup {
    fn task_group(&self) -> &TaskGroup {
        self
    }

    fn task_group_mut(&mut self) -> &mut TaskGroup {
        self
    }
}

/// The work of an [`IndexableTaskItem`].
#[async_trait]
pub trait IndexableTask: Send + Sync + 'static {
    /// Perform the work. The returned value should be keyed by `key`.
    async fn invoke_task(&self, key: &str, context: &InvocationContext) -> TaskResult;

    /// See [`TaskItem::before_group_invoke`].
    ///
    /// # Errors
    ///
    /// Errors abort the invocation before anything is dispatched.
    fn before_group_invoke(&self, group: &mut TaskGroup) -> Result<()> {
        let _ = group;
        Ok(())
    }

    /// See [`TaskItem::invoke_after_post_run`].
    async fn invoke_after_post_run(&self, is_group_faulted: bool) -> std::result::Result<(), crate::BoxError> {
        let _ = is_group_faulted;
        Ok(())
    }
}

struct IndexableAdapter<T> {
    key: String,
    task: T,
}

#[async_trait]
impl<T: IndexableTask> TaskItem for IndexableAdapter<T> {
    fn before_group_invoke(&self, group: &mut TaskGroup) -> Result<()> {
        self.task.before_group_invoke(group)
    }

    async fn invoke_async(&self, context: &InvocationContext) -> TaskResult {
        self.task.invoke_task(&self.key, context).await
    }

    async fn invoke_after_post_run(&self, is_group_faulted: bool) -> std::result::Result<(), crate::BoxError> {
        self.task.invoke_after_post_run(is_group_faulted).await
    }
}

/// A keyed task together with the group rooted at it.
#[derive(Clone, Debug)]
pub struct IndexableTaskItem {
    group: TaskGroup,
}

impl IndexableTaskItem {
    /// Create an item keyed `key` running `task`.
    pub fn new(key: impl Into<String>, task: impl IndexableTask) -> Self {
        let key = key.into();
        let adapter = IndexableAdapter {
            key: key.clone(),
            task,
        };
        Self {
            group: TaskGroup::new(key, adapter),
        }
    }

    /// Create an item with a generated key.
    pub fn with_generated_key(task: impl IndexableTask) -> Self {
        Self::new(Uuid::new_v4().to_string(), task)
    }

    /// The item's key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.group.key()
    }

    /// Make this item depend on `dependency`. Returns the dependency's key.
    ///
    /// # Errors
    ///
    /// Returns a graph error if the edge would create a cycle.
    pub fn add_dependency(&mut self, dependency: &impl HasTaskGroup) -> Result<String> {
        self.group.add_dependency_task_group(dependency.task_group())
    }

    /// Make this item depend on a closure-backed task. Returns the generated key.
    ///
    /// # Errors
    ///
    /// Same as [`TaskGroup::add_dependency_fn`].
    pub fn add_dependency_fn<F, Fut>(&mut self, func: F) -> Result<String>
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.group.add_dependency_fn(func)
    }

    /// Run `dependent` after this item. Returns the dependent's key.
    ///
    /// # Errors
    ///
    /// Returns a graph error if `dependent` is already a dependency of this item.
    pub fn add_post_run_dependent(&self, dependent: &mut impl HasTaskGroup) -> Result<String> {
        self.group
            .add_post_run_dependent_task_group(dependent.task_group_mut())
    }

    /// Run a closure-backed task after this item. Returns the generated key.
    ///
    /// # Errors
    ///
    /// Same as [`TaskGroup::add_post_run_dependent_fn`].
    pub fn add_post_run_dependent_fn<F, Fut>(&self, func: F) -> Result<String>
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let item = FunctionalTaskItem::new(func);
        let key = item.key().to_string();
        self.group.add_post_run_dependent(key, item)
    }

    /// The result of a task this item depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`](crate::Error::TaskNotFound) if no
    /// such task is reachable.
    pub fn task_result(&self, key: &str) -> Result<Option<Indexable>> {
        self.group.task_result(key)
    }

    /// This item's own result, once produced.
    #[must_use]
    pub fn result(&self) -> Option<Indexable> {
        self.group.root().result()
    }

    /// Drop this item's cached result so the next invocation runs it again.
    pub fn clear(&self) {
        self.group.root().clear_result();
    }

    /// Run this item and everything it depends on, returning its result.
    ///
    /// # Errors
    ///
    /// Returns the error that terminated the invocation.
    pub async fn create_async(&self, context: &InvocationContext) -> Result<Indexable> {
        self.group.invoke_async(context).await
    }
}

impl HasTaskGroup for IndexableTaskItem {
    fn task_group(&self) -> &TaskGroup {
        &self.group
    }

    fn task_group_mut(&mut self) -> &mut TaskGroup {
        &mut self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Resource;

    #[async_trait]
    impl IndexableTask for Resource {
        async fn invoke_task(&self, key: &str, _context: &InvocationContext) -> TaskResult {
            Ok(Indexable::new(key, format!("/subscriptions/sub/{key}")))
        }
    }

    #[tokio::test]
    async fn test_create_runs_dependencies_first() {
        let network = IndexableTaskItem::new("vnet", Resource);
        let mut vm = IndexableTaskItem::new("vm", Resource);
        assert_eq!(vm.add_dependency(&network).unwrap(), "vnet");

        let result = vm.create_async(&InvocationContext::new()).await.unwrap();
        assert_eq!(result.key(), "vm");
        assert_eq!(
            result.downcast_ref::<String>().map(String::as_str),
            Some("/subscriptions/sub/vm")
        );
        assert!(vm.task_result("vnet").unwrap().is_some());
        assert!(network.result().is_some());
        assert_eq!(vm.result().map(|r| r.key().to_string()), Some("vm".to_string()));
    }

    #[tokio::test]
    async fn test_post_run_dependent_runs_after_item() {
        let vm = IndexableTaskItem::new("vm", Resource);
        let mut extension = IndexableTaskItem::new("extension", Resource);
        vm.add_post_run_dependent(&mut extension).unwrap();

        vm.create_async(&InvocationContext::new()).await.unwrap();
        assert!(extension.result().is_some());
        assert!(vm.task_result("extension").unwrap().is_some());

        vm.clear();
        assert!(vm.result().is_none());
        assert!(extension.result().is_some());
    }

    #[test]
    fn test_generated_key() {
        let item = IndexableTaskItem::with_generated_key(Resource);
        assert!(Uuid::parse_str(item.key()).is_ok());
        assert!(item.task_result("missing").is_err());
    }
}

//! Proxy groups for post-run dependents.
//!
//! Registering a post-run dependent Y on a group X activates a proxy for X:
//! a new entry keyed `proxy-<X>` that depends on X itself and on Y, while Y
//! depends on X. X's root then forwards to the proxy, so every group that
//! depends on X (now or later) waits for the proxy, and every invocation of
//! X runs through it.

use crate::entry::{EntryTask, TaskGroupEntry, TaskGroupEntryExt};
use crate::{BoxError, Indexable, InvocationContext, Result, TaskGroup, TaskItem, TaskResult};
use async_trait::async_trait;
use fluentcore_task_graph::{DirectedGraph, GraphEntry};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Prefix of proxy entry keys.
pub const PROXY_KEY_PREFIX: &str = "proxy-";

/// The root task of a proxy group. Delegates to the actual group's root.
pub struct ProxyTaskItem {
    actual: Weak<TaskGroupEntry>,
    actual_key: String,
}

impl ProxyTaskItem {
    fn new(actual: &Arc<TaskGroupEntry>) -> Self {
        Self {
            actual: Arc::downgrade(actual),
            actual_key: actual.key().to_string(),
        }
    }

    /// Key of the actual group's root.
    #[must_use]
    pub fn actual_key(&self) -> &str {
        &self.actual_key
    }
}

#[async_trait]
impl TaskItem for ProxyTaskItem {
    fn result(&self) -> Option<Indexable> {
        self.actual.upgrade().and_then(|entry| entry.task_result())
    }

    async fn invoke_async(&self, _context: &InvocationContext) -> TaskResult {
        Ok(self
            .result()
            .unwrap_or_else(|| Indexable::void(self.actual_key.clone())))
    }

    async fn invoke_after_post_run(&self, is_group_faulted: bool) -> std::result::Result<(), BoxError> {
        let Some(actual) = self.actual.upgrade() else {
            return Ok(());
        };
        let item = actual.data().task_item();
        item.invoke_after_post_run(is_group_faulted).await
    }
}

/// View over a group that manages its proxy.
pub struct ProxyTaskGroupWrapper<'a> {
    actual: &'a TaskGroup,
}

impl<'a> ProxyTaskGroupWrapper<'a> {
    /// Wrap the actual group.
    #[must_use]
    pub fn new(actual: &'a TaskGroup) -> Self {
        Self { actual }
    }

    /// Whether a proxy has been activated for the actual group.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.actual.root().is_forwarded()
    }

    /// The proxy group, if active.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy graph cannot be walked.
    pub fn task_group(&self) -> Result<Option<TaskGroup>> {
        self.actual
            .root()
            .forwarded()
            .map(TaskGroup::from_entry)
            .transpose()
    }

    /// Run `post_run` after the actual group, activating the proxy if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the new edges would create a cycle.
    pub fn add_post_run_task_group_for_actual_task_group(&self, post_run: &mut TaskGroup) -> Result<()> {
        let proxy_entry = match self.actual.root().forwarded() {
            Some(entry) => entry,
            None => self.activate()?,
        };

        post_run
            .graph_mut()
            .add_pinned_dependency_graph(self.actual.graph())?;
        let mut proxy = TaskGroup::from_entry(proxy_entry)?;
        proxy.graph_mut().add_dependency_graph(post_run.graph())?;

        trace!(
            "Post-run group '{}' registered on '{}'",
            post_run.key(),
            self.actual.key()
        );
        Ok(())
    }

    /// Make `dependent` depend on the actual group, through the proxy if one
    /// is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge would create a cycle.
    pub fn add_dependent_task_group(&self, dependent: &mut TaskGroup) -> Result<()> {
        match self.task_group()? {
            Some(proxy) => dependent.graph_mut().add_dependency_graph(proxy.graph())?,
            None => dependent.graph_mut().add_dependency_graph(self.actual.graph())?,
        }
        Ok(())
    }

    fn activate(&self) -> Result<Arc<TaskGroupEntry>> {
        let actual_root = self.actual.root();
        let proxy_key = format!("{PROXY_KEY_PREFIX}{}", actual_root.key());
        let proxy_entry = Arc::new(GraphEntry::new(
            proxy_key.as_str(),
            EntryTask::Proxy(Arc::new(ProxyTaskItem::new(actual_root))),
        ));

        let mut proxy = DirectedGraph::new(Arc::clone(&proxy_entry));
        proxy.add_pinned_dependency_graph(self.actual.graph())?;
        actual_root.forward_to(&proxy_entry);

        crate::emit_proxy_activated!(actual_root.key(), proxy_key);
        Ok(proxy_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl TaskItem for Named {
        async fn invoke_async(&self, _context: &InvocationContext) -> TaskResult {
            Ok(Indexable::new(self.0, self.0.to_uppercase()))
        }
    }

    #[test]
    fn test_activation_forwards_actual_root() {
        let actual = TaskGroup::new("vm", Named("vm"));
        let mut post_run = TaskGroup::new("extension", Named("extension"));
        let wrapper = ProxyTaskGroupWrapper::new(&actual);
        assert!(!wrapper.is_active());
        assert!(wrapper.task_group().unwrap().is_none());

        wrapper
            .add_post_run_task_group_for_actual_task_group(&mut post_run)
            .unwrap();

        assert!(wrapper.is_active());
        let proxy = wrapper.task_group().unwrap().unwrap();
        assert_eq!(proxy.key(), "proxy-vm");
        assert!(Arc::ptr_eq(&actual.root().resolve(), proxy.root()));

        // Post-run group depends on the actual root, not on the proxy
        assert_eq!(post_run.graph().dependency_keys("extension"), vec!["vm"]);
        let mut proxy_deps = proxy.graph().dependency_keys("proxy-vm");
        proxy_deps.sort();
        assert_eq!(proxy_deps, vec!["extension", "vm"]);
    }

    #[test]
    fn test_proxy_is_activated_once() {
        let actual = TaskGroup::new("vm", Named("vm"));
        let mut first = TaskGroup::new("first", Named("first"));
        let mut second = TaskGroup::new("second", Named("second"));
        let wrapper = ProxyTaskGroupWrapper::new(&actual);

        wrapper
            .add_post_run_task_group_for_actual_task_group(&mut first)
            .unwrap();
        let proxy_root = Arc::clone(actual.root().forwarded().as_ref().unwrap());
        wrapper
            .add_post_run_task_group_for_actual_task_group(&mut second)
            .unwrap();

        assert!(Arc::ptr_eq(&proxy_root, &actual.root().resolve()));
        let proxy = wrapper.task_group().unwrap().unwrap();
        assert_eq!(proxy.graph().dependency_keys("proxy-vm").len(), 3);
    }

    #[tokio::test]
    async fn test_proxy_item_delegates_result() {
        let actual = TaskGroup::new("vm", Named("vm"));
        let proxy = ProxyTaskItem::new(actual.root());
        let context = InvocationContext::new();

        assert!(proxy.result().is_none());
        assert!(proxy.invoke_async(&context).await.unwrap().is_void());

        actual.root().set_result(Indexable::new("vm", 42_u32));
        assert_eq!(
            proxy.result().and_then(|r| r.downcast_ref::<u32>().copied()),
            Some(42)
        );
        assert_eq!(proxy.actual_key(), "vm");
    }
}

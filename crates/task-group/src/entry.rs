//! Graph entries holding task items.

use crate::{Indexable, ProxyTaskItem, TaskItem};
use fluentcore_task_graph::GraphEntry;
use std::fmt;
use std::sync::Arc;

/// A node of a task group's graph. The cached result slot holds the task's
/// last value; the forwarding link points at the group's proxy once one is
/// active.
pub type TaskGroupEntry = GraphEntry<EntryTask, Indexable>;

/// Payload of a [`TaskGroupEntry`].
#[derive(Clone)]
pub enum EntryTask {
    /// A task supplied by the caller.
    Item(Arc<dyn TaskItem>),
    /// The stand-in root of a group that has post-run dependents.
    Proxy(Arc<ProxyTaskItem>),
}

impl EntryTask {
    /// The payload as a task item.
    #[must_use]
    pub fn task_item(&self) -> Arc<dyn TaskItem> {
        match self {
            Self::Item(item) => Arc::clone(item),
            Self::Proxy(proxy) => Arc::clone(proxy) as Arc<dyn TaskItem>,
        }
    }
}

impl fmt::Debug for EntryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(_) => f.write_str("Item"),
            Self::Proxy(proxy) => f.debug_tuple("Proxy").field(&proxy.actual_key()).finish(),
        }
    }
}

/// Task-level helpers on [`TaskGroupEntry`].
pub trait TaskGroupEntryExt {
    /// The cached result, falling back to the task's own result.
    fn task_result(&self) -> Option<Indexable>;
}

impl TaskGroupEntryExt for TaskGroupEntry {
    fn task_result(&self) -> Option<Indexable> {
        self.result().or_else(|| self.data().task_item().result())
    }
}

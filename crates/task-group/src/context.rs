//! Per-invocation context shared by every task in a group.

use crate::entry::{TaskGroupEntry, TaskGroupEntryExt};
use crate::{EngineConfig, Error, Indexable, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// How the engine reacts once a task faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationStrategy {
    /// Only dependents of the faulted task are suppressed; unrelated
    /// branches run to completion.
    #[default]
    TerminateOnHittingLcaTask,
    /// No new task is started after the first fault; tasks already in
    /// flight are allowed to finish.
    TerminateOnInProgressTasksCompletion,
}

type Values = HashMap<String, Arc<dyn Any + Send + Sync>>;
type Entries = HashMap<String, Arc<TaskGroupEntry>>;

/// Key/value bag passed to every task of one invocation.
///
/// Clones share the same storage, so a value put by one task is visible to
/// tasks that run after it. The termination strategy, skip set and prepare
/// limit are fixed when the context is built.
#[derive(Clone)]
pub struct InvocationContext {
    values: Arc<RwLock<Values>>,
    termination_strategy: TerminationStrategy,
    skip_tasks: Arc<HashSet<String>>,
    max_prepare_passes: usize,
    cancelled: Arc<AtomicBool>,
    entries: Arc<RwLock<Entries>>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl InvocationContext {
    /// Create a context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            values: Arc::default(),
            termination_strategy: config.termination_strategy,
            skip_tasks: Arc::default(),
            max_prepare_passes: config.max_prepare_passes,
            cancelled: Arc::default(),
            entries: Arc::default(),
        }
    }

    /// Set the termination strategy.
    #[must_use]
    pub fn with_termination_strategy(mut self, strategy: TerminationStrategy) -> Self {
        self.termination_strategy = strategy;
        self
    }

    /// Tasks with these keys complete without being invoked.
    #[must_use]
    pub fn with_skip_tasks<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_tasks = Arc::new(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Limit the number of preparation passes.
    #[must_use]
    pub fn with_max_prepare_passes(mut self, passes: usize) -> Self {
        self.max_prepare_passes = passes;
        self
    }

    /// The termination strategy for this invocation.
    #[must_use]
    pub fn termination_strategy(&self) -> TerminationStrategy {
        self.termination_strategy
    }

    /// Keys of the tasks that are skipped.
    #[must_use]
    pub fn skip_tasks(&self) -> &HashSet<String> {
        &self.skip_tasks
    }

    /// Whether the task `key` is skipped.
    #[must_use]
    pub fn is_skipped(&self, key: &str) -> bool {
        self.skip_tasks.contains(key)
    }

    /// Upper bound on preparation passes.
    #[must_use]
    pub fn max_prepare_passes(&self) -> usize {
        self.max_prepare_passes
    }

    fn values(&self) -> std::sync::RwLockReadGuard<'_, Values> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn values_mut(&self) -> std::sync::RwLockWriteGuard<'_, Values> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.values_mut().insert(key.into(), Arc::new(value));
    }

    /// Get the value under `key` if it is a `V`.
    #[must_use]
    pub fn get<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.values()
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<V>().ok())
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.values().contains_key(key)
    }

    /// Remove the value under `key`. Returns whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.values_mut().remove(key).is_some()
    }

    /// Whether the group was cancelled after a fault.
    ///
    /// Only set under
    /// [`TerminationStrategy::TerminateOnInProgressTasksCompletion`]. Long
    /// running tasks may poll this to stop early.
    #[must_use]
    pub fn is_group_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_group(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub(crate) fn install_entries<'a>(&self, entries: impl IntoIterator<Item = &'a Arc<TaskGroupEntry>>) {
        let mut table = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        table.clear();
        table.extend(
            entries
                .into_iter()
                .map(|entry| (entry.key().to_string(), Arc::clone(entry))),
        );
    }

    /// The result of task `key` in the graph being invoked with this context.
    ///
    /// Returns `Ok(None)` if the task has not produced a result yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] if the invoked graph has no such task.
    pub fn task_result(&self, key: &str) -> Result<Option<Indexable>> {
        let table = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        table
            .get(key)
            .map(|entry| entry.task_result())
            .ok_or_else(|| Error::task_not_found(key))
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("keys", &self.values().keys().collect::<Vec<_>>())
            .field("termination_strategy", &self.termination_strategy)
            .field("skip_tasks", &self.skip_tasks)
            .field("max_prepare_passes", &self.max_prepare_passes)
            .field("cancelled", &self.is_group_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let context = InvocationContext::new();
        context.put("resourceGroup", String::from("rg-prod"));

        assert!(context.has_key("resourceGroup"));
        assert_eq!(
            context.get::<String>("resourceGroup").as_deref().map(String::as_str),
            Some("rg-prod")
        );
        // Wrong type reads as absent
        assert!(context.get::<u64>("resourceGroup").is_none());

        assert!(context.remove("resourceGroup"));
        assert!(!context.remove("resourceGroup"));
        assert!(!context.has_key("resourceGroup"));
    }

    #[test]
    fn test_clones_share_values() {
        let context = InvocationContext::new();
        let clone = context.clone();
        clone.put("region", "westus");
        assert_eq!(context.get::<&str>("region").as_deref(), Some(&"westus"));
    }

    #[test]
    fn test_builder_settings() {
        let context = InvocationContext::new()
            .with_termination_strategy(TerminationStrategy::TerminateOnInProgressTasksCompletion)
            .with_skip_tasks(["vm", "nic"])
            .with_max_prepare_passes(3);

        assert_eq!(
            context.termination_strategy(),
            TerminationStrategy::TerminateOnInProgressTasksCompletion
        );
        assert!(context.is_skipped("vm"));
        assert!(!context.is_skipped("disk"));
        assert_eq!(context.skip_tasks().len(), 2);
        assert_eq!(context.max_prepare_passes(), 3);
    }

    #[test]
    fn test_defaults_follow_engine_config() {
        let context = InvocationContext::default();
        let config = EngineConfig::default();
        assert_eq!(context.termination_strategy(), config.termination_strategy);
        assert_eq!(context.max_prepare_passes(), config.max_prepare_passes);
        assert!(!context.is_group_cancelled());
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let context = InvocationContext::new();
        let clone = context.clone();
        clone.cancel_group();
        assert!(context.is_group_cancelled());
        context.reset_cancellation();
        assert!(!clone.is_group_cancelled());
    }

    #[test]
    fn test_task_result_unknown_key() {
        let context = InvocationContext::new();
        assert!(matches!(
            context.task_result("vm"),
            Err(Error::TaskNotFound { .. })
        ));
    }
}

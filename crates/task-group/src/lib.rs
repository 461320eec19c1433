//! Concurrent invocation of dependency graphs of asynchronous tasks.
//!
//! A [`TaskGroup`] is a graph of [`TaskItem`]s rooted at one task. Invoking
//! the group runs every reachable task exactly once, each after its
//! dependencies, with independent tasks running concurrently. Results are
//! yielded in completion order.
//!
//! # Key Types
//!
//! - [`TaskItem`]: The unit of asynchronous work
//! - [`TaskGroup`]: A graph of task items with one invocation lifecycle
//! - [`InvocationContext`]: Per-invocation values, termination strategy and
//!   result lookup shared by every task
//! - [`IndexableTaskItem`]: A task that owns the group rooted at it
//! - [`FunctionalTaskItem`]: A task backed by a closure
//! - [`FaultKind`]: Why a task did not produce a result
//!
//! # Post-run dependents
//!
//! [`TaskGroup::add_post_run_dependent_task_group`] registers work that must
//! run after a group's root, even when other groups already depend on it. The
//! group is transparently replaced by a proxy (see [`ProxyTaskGroupWrapper`])
//! so every existing and future dependent waits for the post-run work too.
//!
//! # Faults
//!
//! A fault suppresses the tasks downstream of it; unrelated branches keep
//! running. Under [`TerminationStrategy::TerminateOnInProgressTasksCompletion`]
//! nothing new starts after the first fault. Either way the invocation ends
//! with one [`Error::Faulted`] carrying only the faults raised by task code.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use fluentcore_task_group::{Indexable, InvocationContext, TaskGroup, TaskItem, TaskResult};
//!
//! struct Create(&'static str);
//!
//! #[async_trait]
//! impl TaskItem for Create {
//!     async fn invoke_async(&self, _context: &InvocationContext) -> TaskResult {
//!         Ok(Indexable::new(self.0, format!("/resources/{}", self.0)))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let mut vm = TaskGroup::new("vm", Create("vm"));
//! vm.add_dependency("nic", Create("nic"))?;
//!
//! let result = vm.invoke_async(&InvocationContext::new()).await?;
//! assert_eq!(result.key(), "vm");
//! assert!(vm.task_result("nic")?.is_some());
//! # Ok::<(), fluentcore_task_group::Error>(())
//! # }).unwrap();
//! ```

mod config;
mod context;
mod entry;
mod error;
mod events;
mod functional;
mod group;
mod indexable;
mod invoke;
mod item;
mod proxy;

pub use config::{DEFAULT_MAX_PREPARE_PASSES, EngineConfig};
pub use context::{InvocationContext, TerminationStrategy};
pub use entry::{EntryTask, TaskGroupEntry, TaskGroupEntryExt};
pub use error::{BoxError, Error, FaultKind, Result};
pub use functional::{FunctionalContext, FunctionalTaskItem};
pub use group::TaskGroup;
pub use indexable::{HasTaskGroup, IndexableTask, IndexableTaskItem};
pub use item::{Activation, Indexable, TaskItem, TaskResult};
pub use proxy::{PROXY_KEY_PREFIX, ProxyTaskItem, ProxyTaskGroupWrapper};

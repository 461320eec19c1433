//! The task capability and the values tasks produce.

use crate::{BoxError, InvocationContext, Result, TaskGroup};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// What a task's work returns.
pub type TaskResult = std::result::Result<Indexable, BoxError>;

/// A keyed, type-erased task output.
///
/// The key normally matches the producing task's key. Tasks without a
/// meaningful value return [`Indexable::void`].
#[derive(Clone)]
pub struct Indexable {
    key: String,
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl Indexable {
    /// Wrap `value` under `key`.
    pub fn new<V: Any + Send + Sync>(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value: Some(Arc::new(value)),
        }
    }

    /// A result carrying only a key.
    pub fn void(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// The key this result is indexed by.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this result carries no value.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.value.is_none()
    }

    /// Borrow the value if it is a `V`.
    #[must_use]
    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.value.as_deref().and_then(|value| value.downcast_ref::<V>())
    }

    /// Share the value if it is a `V`.
    #[must_use]
    pub fn downcast<V: Any + Send + Sync>(&self) -> Option<Arc<V>> {
        self.value
            .clone()
            .and_then(|value| value.downcast::<V>().ok())
    }
}

impl fmt::Debug for Indexable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexable")
            .field("key", &self.key)
            .field("void", &self.is_void())
            .finish()
    }
}

/// How a task's asynchronous work is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activation {
    /// Work starts when invoked; the engine spawns it onto the runtime.
    #[default]
    ColdUnstarted,
    /// Work is already under way; the engine polls the returned future in
    /// place instead of starting anything new.
    HotInFlight,
}

/// A unit of asynchronous work in a [`TaskGroup`].
#[async_trait]
pub trait TaskItem: Send + Sync + 'static {
    /// The value produced by an earlier invocation, if the task keeps one.
    ///
    /// The engine caches results itself; override this only for tasks that
    /// already hold a value before they are first invoked.
    fn result(&self) -> Option<Indexable> {
        None
    }

    /// Called once per invocation, before any task in the group runs.
    ///
    /// `group` is rooted at this task. The hook may add dependencies or
    /// post-run dependents; newly discovered tasks are prepared in a further
    /// pass.
    ///
    /// # Errors
    ///
    /// Errors abort the invocation before anything is dispatched.
    fn before_group_invoke(&self, group: &mut TaskGroup) -> Result<()> {
        let _ = group;
        Ok(())
    }

    /// How the engine should drive [`invoke_async`](Self::invoke_async).
    fn activation(&self) -> Activation {
        Activation::ColdUnstarted
    }

    /// Whether the task's work is already in flight.
    fn is_hot(&self) -> bool {
        self.activation() == Activation::HotInFlight
    }

    /// Perform the work.
    async fn invoke_async(&self, context: &InvocationContext) -> TaskResult;

    /// Called after the post-run dependents of this task's group have
    /// settled, whether or not they succeeded.
    ///
    /// # Errors
    ///
    /// An error is reported as a fault of the group's proxy task.
    async fn invoke_after_post_run(&self, is_group_faulted: bool) -> std::result::Result<(), BoxError> {
        let _ = is_group_faulted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexable_downcast() {
        let result = Indexable::new("vnet", String::from("10.0.0.0/16"));
        assert_eq!(result.key(), "vnet");
        assert!(!result.is_void());
        assert_eq!(result.downcast_ref::<String>().map(String::as_str), Some("10.0.0.0/16"));
        assert!(result.downcast_ref::<u32>().is_none());
        assert_eq!(result.downcast::<String>().as_deref().map(String::as_str), Some("10.0.0.0/16"));
    }

    #[test]
    fn test_void_indexable() {
        let result = Indexable::void("rg");
        assert!(result.is_void());
        assert!(result.downcast_ref::<()>().is_none());
        assert!(format!("{result:?}").contains("rg"));
    }

    #[test]
    fn test_activation_default_is_cold() {
        assert_eq!(Activation::default(), Activation::ColdUnstarted);
    }
}

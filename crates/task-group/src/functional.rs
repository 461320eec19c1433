//! Closure-backed tasks.

use crate::{Indexable, InvocationContext, Result, TaskItem, TaskResult};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

type TaskFn = dyn Fn(FunctionalContext) -> BoxFuture<'static, TaskResult> + Send + Sync;

/// What a [`FunctionalTaskItem`]'s closure receives.
#[derive(Clone, Debug)]
pub struct FunctionalContext {
    key: String,
    context: InvocationContext,
}

impl FunctionalContext {
    /// Key of the task being run.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The context of the current invocation.
    #[must_use]
    pub fn invocation_context(&self) -> &InvocationContext {
        &self.context
    }

    /// A void result keyed by this task.
    #[must_use]
    pub fn void_result(&self) -> Indexable {
        Indexable::void(self.key.clone())
    }

    /// The result of another task in the invoked graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`](crate::Error::TaskNotFound) if the
    /// invoked graph has no such task.
    pub fn task_result(&self, key: &str) -> Result<Option<Indexable>> {
        self.context.task_result(key)
    }
}

/// A task whose work is a closure.
#[derive(Clone)]
pub struct FunctionalTaskItem {
    key: String,
    func: Arc<TaskFn>,
}

impl FunctionalTaskItem {
    /// Wrap `func` under a generated key.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self::with_key(Uuid::new_v4().to_string(), func)
    }

    /// Wrap `func` under `key`.
    pub fn with_key<F, Fut>(key: impl Into<String>, func: F) -> Self
    where
        F: Fn(FunctionalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            key: key.into(),
            func: Arc::new(move |cx: FunctionalContext| -> BoxFuture<'static, TaskResult> {
                func(cx).boxed()
            }),
        }
    }

    /// The task's key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for FunctionalTaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalTaskItem")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskItem for FunctionalTaskItem {
    async fn invoke_async(&self, context: &InvocationContext) -> TaskResult {
        let cx = FunctionalContext {
            key: self.key.clone(),
            context: context.clone(),
        };
        (self.func)(cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique() {
        let a = FunctionalTaskItem::new(|cx| async move { Ok(cx.void_result()) });
        let b = FunctionalTaskItem::new(|cx| async move { Ok(cx.void_result()) });
        assert_ne!(a.key(), b.key());
        assert!(Uuid::parse_str(a.key()).is_ok());
    }

    #[tokio::test]
    async fn test_closure_sees_key_and_context() {
        let item = FunctionalTaskItem::with_key("tag", |cx| async move {
            let region = cx
                .invocation_context()
                .get::<String>("region")
                .map(|r| r.as_str().to_owned())
                .unwrap_or_default();
            Ok(Indexable::new(cx.key(), region))
        });

        let context = InvocationContext::new();
        context.put("region", String::from("eastus"));

        let result = item.invoke_async(&context).await.unwrap();
        assert_eq!(result.key(), "tag");
        assert_eq!(result.downcast_ref::<String>().map(String::as_str), Some("eastus"));
    }

    #[tokio::test]
    async fn test_void_result_uses_task_key() {
        let item = FunctionalTaskItem::with_key("noop", |cx| async move { Ok(cx.void_result()) });
        let result = item.invoke_async(&InvocationContext::new()).await.unwrap();
        assert!(result.is_void());
        assert_eq!(result.key(), "noop");
    }
}

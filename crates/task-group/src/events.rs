//! Structured task lifecycle events.
//!
//! Events are plain `tracing` records under the `fluentcore::task` target with
//! an `event_type` field, so any subscriber can filter or render them.

/// Emit a task dispatched event.
///
/// # Example
/// ```rust,ignore
/// emit_task_dispatched!("vm", "cold");
/// ```
#[macro_export]
macro_rules! emit_task_dispatched {
    ($key:expr, $activation:expr) => {
        ::tracing::debug!(
            target: "fluentcore::task",
            event_type = "task.dispatched",
            task_key = %$key,
            activation = %$activation,
        )
    };
}

/// Emit a task completed event.
///
/// # Example
/// ```rust,ignore
/// emit_task_completed!("vm", false);
/// ```
#[macro_export]
macro_rules! emit_task_completed {
    ($key:expr, $cached:expr) => {
        ::tracing::info!(
            target: "fluentcore::task",
            event_type = "task.completed",
            task_key = %$key,
            cached = $cached,
        )
    };
}

/// Emit a task skipped event.
///
/// # Example
/// ```rust,ignore
/// emit_task_skipped!("vm");
/// ```
#[macro_export]
macro_rules! emit_task_skipped {
    ($key:expr) => {
        ::tracing::info!(
            target: "fluentcore::task",
            event_type = "task.skipped",
            task_key = %$key,
        )
    };
}

/// Emit a task faulted event.
///
/// # Example
/// ```rust,ignore
/// emit_task_faulted!("vm", "user", true, "quota exceeded");
/// ```
#[macro_export]
macro_rules! emit_task_faulted {
    ($key:expr, $kind:expr, $propagated:expr, $message:expr) => {
        ::tracing::warn!(
            target: "fluentcore::task",
            event_type = "task.faulted",
            task_key = %$key,
            fault_kind = %$kind,
            propagated = $propagated,
            message = %$message,
        )
    };
}

/// Emit a group prepared event.
///
/// # Example
/// ```rust,ignore
/// emit_group_prepared!("vm", 12, 2);
/// ```
#[macro_export]
macro_rules! emit_group_prepared {
    ($root:expr, $nodes:expr, $passes:expr) => {
        ::tracing::debug!(
            target: "fluentcore::task",
            event_type = "group.prepared",
            root_key = %$root,
            nodes = $nodes,
            passes = $passes,
        )
    };
}

/// Emit a proxy activated event.
///
/// # Example
/// ```rust,ignore
/// emit_proxy_activated!("vm", "proxy-vm");
/// ```
#[macro_export]
macro_rules! emit_proxy_activated {
    ($actual:expr, $proxy:expr) => {
        ::tracing::debug!(
            target: "fluentcore::task",
            event_type = "proxy.activated",
            actual_key = %$actual,
            proxy_key = %$proxy,
        )
    };
}

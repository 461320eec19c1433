//! The invocation driver.
//!
//! An invocation runs in three phases. Preparing calls every task's
//! `before_group_invoke` hook until no new tasks appear. Running dispatches
//! ready entries and, as each one settles, reports it to the graph and
//! dispatches whatever became ready. Finished yields the aggregated fault, if
//! any, and ends the stream.

use crate::entry::{EntryTask, TaskGroupEntry, TaskGroupEntryExt};
use crate::{
    Activation, Error, FaultKind, Indexable, InvocationContext, Result, TaskGroup, TaskItem,
    TaskResult, TerminationStrategy,
};
use fluentcore_task_graph::DirectedGraph;
use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream, FuturesUnordered};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace};

type Graph = DirectedGraph<EntryTask, Indexable>;
type Settled = (Arc<TaskGroupEntry>, Outcome);

/// How a dispatched entry settled.
enum Outcome {
    /// A value to record and yield.
    Emit {
        value: Indexable,
        cached: bool,
    },
    /// Settled without yielding; a value, if any, is recorded.
    Quiet(Option<Indexable>),
    /// The entry did not produce a value.
    Fault(FaultKind),
}

impl Outcome {
    fn from_result(key: String, result: TaskResult) -> Self {
        match result {
            Ok(value) => Self::Emit {
                value,
                cached: false,
            },
            Err(source) => Self::Fault(FaultKind::user(key, source)),
        }
    }

    fn panicked(key: String, cause: &dyn fmt::Display) -> Self {
        let message = format!("Task execution panicked: {cause}");
        Self::Fault(FaultKind::user(key, message.into()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

enum Phase {
    Idle(Invocation),
    Running(Running),
    Finished,
}

/// A pending invocation of a task group.
pub(crate) struct Invocation {
    group: TaskGroup,
    context: InvocationContext,
}

struct Running {
    graph: Graph,
    context: InvocationContext,
    in_flight: FuturesUnordered<BoxFuture<'static, Settled>>,
    faults: Vec<FaultKind>,
}

impl Invocation {
    pub(crate) fn new(group: TaskGroup, context: InvocationContext) -> Self {
        Self { group, context }
    }

    pub(crate) fn into_stream(self) -> BoxStream<'static, Result<Indexable>> {
        stream::unfold(Phase::Idle(self), |phase| async move {
            match phase {
                Phase::Idle(invocation) => match invocation.start() {
                    Ok(running) => running.advance().await,
                    Err(err) => Some((Err(err), Phase::Finished)),
                },
                Phase::Running(running) => running.advance().await,
                Phase::Finished => None,
            }
        })
        .boxed()
    }

    /// Prepare the graph and dispatch the first wave.
    fn start(self) -> Result<Running> {
        let Self { group, context } = self;
        let (mut graph, passes) = prepare(&group, &context)?;
        graph.prepare_for_enumeration()?;

        context.reset_cancellation();
        context.install_entries(graph.nodes());
        crate::emit_group_prepared!(graph.key(), graph.len(), passes);

        let mut running = Running {
            graph,
            context,
            in_flight: FuturesUnordered::new(),
            faults: Vec::new(),
        };
        running.dispatch_ready();
        Ok(running)
    }
}

/// Run `before_group_invoke` on every reachable entry until the graph stops
/// growing. Follows the root's forwarding link, which a hook may activate.
fn prepare(group: &TaskGroup, context: &InvocationContext) -> Result<(Graph, usize)> {
    let actual_root = Arc::clone(group.root());
    let mut graph = group.graph().clone();
    let mut processed: HashSet<String> = HashSet::new();
    let mut passes = 0;

    loop {
        let target = actual_root.resolve();
        if !graph.is_root(&target) {
            debug!(
                "Invocation of '{}' redirected to '{}'",
                actual_root.key(),
                target.key()
            );
            let mut redirected = DirectedGraph::new(target);
            for entry in graph.nodes() {
                redirected.add_node(Arc::clone(entry))?;
            }
            graph = redirected;
        }
        graph.refresh()?;

        let mut pending: Vec<Arc<TaskGroupEntry>> = graph
            .nodes()
            .filter(|entry| !processed.contains(entry.key()))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok((graph, passes));
        }
        if passes == context.max_prepare_passes() {
            return Err(Error::PrepareDidNotConverge { passes });
        }
        passes += 1;

        pending.sort_by(|a, b| a.key().cmp(b.key()));
        for entry in pending {
            processed.insert(entry.key().to_string());
            let item = entry.data().task_item();
            let mut view = TaskGroup::view(entry);
            item.before_group_invoke(&mut view)?;
        }
        trace!("Prepare pass {} over '{}' complete", passes, graph.key());
    }
}

impl Running {
    /// Wait for the next entry to settle and return the next stream item.
    async fn advance(mut self) -> Option<(Result<Indexable>, Phase)> {
        while let Some((entry, outcome)) = self.in_flight.next().await {
            if let Some(value) = self.settle(&entry, outcome) {
                return Some((Ok(value), Phase::Running(self)));
            }
        }

        if self.faults.is_empty() {
            debug!("Invocation of '{}' completed", self.graph.key());
            None
        } else {
            let faults = mem::take(&mut self.faults);
            debug!(
                "Invocation of '{}' completed with {} fault(s)",
                self.graph.key(),
                faults.len()
            );
            Some((Err(Error::faulted(faults)), Phase::Finished))
        }
    }

    fn dispatch_ready(&mut self) {
        while let Some(entry) = self.graph.next() {
            let future = self.dispatch(entry);
            self.in_flight.push(future);
        }
    }

    /// The invocation root, or the actual entry it proxies for.
    fn is_root_entry(&self, entry: &Arc<TaskGroupEntry>) -> bool {
        self.graph.is_root(entry)
            || entry
                .forwarded()
                .is_some_and(|target| self.graph.is_root(&target))
    }

    fn dispatch(&self, entry: Arc<TaskGroupEntry>) -> BoxFuture<'static, Settled> {
        let key = entry.key().to_string();
        let faulted_dependency = self.graph.has_faulted_dependency(&key);
        let cancelled = self.context.is_group_cancelled();

        let item = match entry.data() {
            EntryTask::Proxy(proxy) => {
                let proxy = Arc::clone(proxy);
                crate::emit_task_dispatched!(key, "proxy");
                return async move {
                    let is_group_faulted = faulted_dependency || cancelled;
                    let outcome = match proxy.invoke_after_post_run(is_group_faulted).await {
                        Err(source) => Outcome::Fault(FaultKind::user(key, source)),
                        Ok(()) if faulted_dependency => {
                            Outcome::Fault(FaultKind::DependencyFaulted { key })
                        }
                        Ok(()) if cancelled => Outcome::Fault(FaultKind::Cancelled { key }),
                        Ok(()) => Outcome::Quiet(proxy.result()),
                    };
                    (entry, outcome)
                }
                .boxed();
            }
            EntryTask::Item(item) => Arc::clone(item),
        };

        let settled = |entry: Arc<TaskGroupEntry>, outcome: Outcome| -> BoxFuture<'static, Settled> {
            future::ready((entry, outcome)).boxed()
        };
        if cancelled {
            return settled(entry, Outcome::Fault(FaultKind::Cancelled { key }));
        }
        if faulted_dependency {
            return settled(entry, Outcome::Fault(FaultKind::DependencyFaulted { key }));
        }
        if self.context.is_skipped(&key) {
            crate::emit_task_skipped!(key);
            return settled(entry, Outcome::Quiet(None));
        }
        if !self.is_root_entry(&entry)
            && let Some(value) = entry.task_result()
        {
            return settled(entry, Outcome::Emit { value, cached: true });
        }

        let context = self.context.clone();
        let runtime = match item.activation() {
            Activation::ColdUnstarted => Handle::try_current().ok(),
            Activation::HotInFlight => None,
        };
        match runtime {
            Some(runtime) => {
                crate::emit_task_dispatched!(key, "cold");
                let handle = runtime.spawn(async move { item.invoke_async(&context).await });
                async move {
                    let outcome = match handle.await {
                        Ok(result) => Outcome::from_result(key, result),
                        Err(join_error) => Outcome::panicked(key, &join_error),
                    };
                    (entry, outcome)
                }
                .boxed()
            }
            // Hot work, or cold work with no tokio runtime to spawn onto
            None => {
                let mode = if item.is_hot() { "hot" } else { "inline" };
                crate::emit_task_dispatched!(key, mode);
                async move {
                    let invoked = AssertUnwindSafe(item.invoke_async(&context))
                        .catch_unwind()
                        .await;
                    let outcome = match invoked {
                        Ok(result) => Outcome::from_result(key, result),
                        Err(payload) => Outcome::panicked(key, &panic_message(payload.as_ref())),
                    };
                    (entry, outcome)
                }
                .boxed()
            }
        }
    }

    /// Record how `entry` settled and release its dependents. Returns the
    /// value to yield, if any.
    fn settle(&mut self, entry: &Arc<TaskGroupEntry>, outcome: Outcome) -> Option<Indexable> {
        let key = entry.key().to_string();
        let yielded = match outcome {
            Outcome::Emit { value, cached } => {
                entry.set_result(value.clone());
                crate::emit_task_completed!(key, cached);
                self.graph.report_completion(&key);
                Some(value)
            }
            Outcome::Quiet(value) => {
                if let Some(value) = value {
                    entry.set_result(value);
                }
                self.graph.report_completion(&key);
                None
            }
            Outcome::Fault(fault) => {
                if self.context.termination_strategy()
                    == TerminationStrategy::TerminateOnInProgressTasksCompletion
                {
                    self.context.cancel_group();
                }
                crate::emit_task_faulted!(key, fault.kind(), fault.is_propagated(), fault);
                self.graph.report_error(&key);
                if fault.is_propagated() {
                    self.faults.push(fault);
                }
                None
            }
        };

        if !self.graph.is_root(entry) {
            self.dispatch_ready();
        }
        yielded
    }
}

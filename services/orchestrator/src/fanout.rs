//! Fan-out executor: run one action per node concurrently and aggregate.
//!
//! Each node gets its own spawned task, so a slow or hung node never delays
//! another node's call. Outcomes are consumed in completion order.
//!
//! ## Completion policies
//!
//! - [`CompletionPolicy::WaitForAll`]: wait for every node. The error, if
//!   any, is the first hard failure to complete.
//! - [`CompletionPolicy::FirstCompletion`]: return with the first node to
//!   finish, whatever its outcome. The other tasks are detached, not
//!   aborted: they run to completion on their own and their outcomes are
//!   only logged. Nothing cancels them; the node transport's timeout is what
//!   bounds them.
//!
//! Detached tasks live on the tokio runtime. A process that is about to drop
//! its runtime passes a [`BackgroundTasks`] to [`run_on_nodes_in`] and waits
//! on it before exiting, otherwise the runtime shutdown cuts them short.
//!
//! A failure whose kind matches the ignorable kind means "nothing to do on
//! that node". It is counted in [`FanOutOutcome::ignored`] and never fails
//! the call.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::{join_all, BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn, Instrument};

use crate::error::ClusterError;
use crate::node::{NodeError, NodeErrorKind, NodeHandle};

/// When a fan-out call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Block until every node has finished.
    #[default]
    WaitForAll,

    /// Return as soon as one node has finished; the rest keep running
    /// detached.
    FirstCompletion,
}

impl CompletionPolicy {
    pub fn from_wait_for_all(wait_for_all: bool) -> Self {
        if wait_for_all {
            Self::WaitForAll
        } else {
            Self::FirstCompletion
        }
    }

    pub fn waits_for_all(&self) -> bool {
        matches!(self, Self::WaitForAll)
    }
}

/// Summary of a fan-out call that did not hit a hard failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutOutcome<T> {
    /// Values from the nodes that succeeded, in completion order.
    pub values: Vec<T>,

    /// Number of nodes that failed with the ignorable kind.
    pub ignored: usize,

    /// Number of node outcomes observed before returning.
    pub completed: usize,
}

impl<T> FanOutOutcome<T> {
    fn empty() -> Self {
        Self {
            values: Vec::new(),
            ignored: 0,
            completed: 0,
        }
    }

    /// True if at least one node reported the ignorable failure.
    pub fn saw_ignorable(&self) -> bool {
        self.ignored > 0
    }
}

/// Node tasks left running by first-completion fan-outs.
///
/// Clones share one set. Dropping the set detaches whatever it still holds.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    pending: Arc<Mutex<Vec<BoxFuture<'static, ()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks not yet waited for.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every task, including ones added meanwhile, has finished.
    /// Returns how many tasks were waited for.
    pub async fn wait(&self) -> usize {
        let mut waited = 0;
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return waited;
            }
            waited += batch.len();
            join_all(batch).await;
        }
    }

    fn adopt(&self, tasks: impl IntoIterator<Item = BoxFuture<'static, ()>>) {
        self.lock().extend(tasks);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BoxFuture<'static, ()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("pending", &self.len())
            .finish()
    }
}

/// Run `action` once per node, concurrently, and aggregate the outcomes.
///
/// An empty `nodes` list is a no-op under either policy. Under
/// `WaitForAll` the returned error is the first non-ignorable failure in
/// completion order; under `FirstCompletion` it is the first node's
/// failure, if that failure is not ignorable.
pub async fn run_on_nodes<T, F, Fut>(
    action: F,
    ignorable: Option<NodeErrorKind>,
    policy: CompletionPolicy,
    nodes: Vec<NodeHandle>,
) -> Result<FanOutOutcome<T>, ClusterError>
where
    F: Fn(NodeHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, NodeError>> + Send + 'static,
    T: Send + 'static,
{
    run_on_nodes_in(&BackgroundTasks::new(), action, ignorable, policy, nodes).await
}

/// Like [`run_on_nodes`], but tasks still running when the call returns are
/// handed to `background` instead of being left unobserved.
pub async fn run_on_nodes_in<T, F, Fut>(
    background: &BackgroundTasks,
    action: F,
    ignorable: Option<NodeErrorKind>,
    policy: CompletionPolicy,
    nodes: Vec<NodeHandle>,
) -> Result<FanOutOutcome<T>, ClusterError>
where
    F: Fn(NodeHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, NodeError>> + Send + 'static,
    T: Send + 'static,
{
    if nodes.is_empty() {
        return Ok(FanOutOutcome::empty());
    }

    let total = nodes.len();
    let action = Arc::new(action);
    let mut pending: FuturesUnordered<_> = nodes
        .into_iter()
        .map(|node| {
            let address = node.address().clone();
            let action = Arc::clone(&action);
            // Dropping this JoinHandle detaches the task; it is never aborted.
            let task = tokio::spawn(async move { action(node).await }.in_current_span());
            task.map(move |joined| (address, joined))
        })
        .collect();

    let mut outcome = FanOutOutcome::empty();
    let mut first_error: Option<ClusterError> = None;

    while let Some((address, joined)) = pending.next().await {
        outcome.completed += 1;

        match joined {
            Ok(Ok(value)) => {
                debug!(node = %address, "Node action succeeded");
                outcome.values.push(value);
            }
            Ok(Err(error)) if Some(error.kind()) == ignorable => {
                debug!(node = %address, error = %error, "Node action reported nothing to do");
                outcome.ignored += 1;
            }
            Ok(Err(error)) => {
                warn!(node = %address, error = %error, "Node action failed");
                first_error.get_or_insert(ClusterError::Node {
                    address,
                    source: error,
                });
            }
            Err(join_error) => {
                warn!(node = %address, error = %join_error, "Node task failed");
                first_error.get_or_insert(ClusterError::TaskFailed {
                    address,
                    message: join_error.to_string(),
                });
            }
        }

        if !policy.waits_for_all() {
            debug!(
                detached = total - outcome.completed,
                "Returning after first completion"
            );
            break;
        }
    }

    if !pending.is_empty() {
        background.adopt(pending.into_iter().map(|task| {
            async move {
                match task.await {
                    (address, Ok(Ok(_))) => {
                        debug!(node = %address, "Detached node action succeeded");
                    }
                    (address, Ok(Err(error))) => {
                        debug!(node = %address, error = %error, "Detached node action failed");
                    }
                    (address, Err(join_error)) => {
                        warn!(node = %address, error = %join_error, "Detached node task failed");
                    }
                }
            }
            .boxed()
        }));
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(outcome),
    }
}

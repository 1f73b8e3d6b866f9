//! In-process node transport for testing and dry runs.
//!
//! A [`MockNodeClient`] records every call, can be scripted to fail a given
//! operation, can be slowed down, and can be gated so calls stay open until a
//! test releases them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use imgfleet_id::{ImageName, NodeAddress};
use tokio::sync::{Notify, Semaphore};
use tracing::info;

use super::client::{
    BuildImageOptions, ImportImageOptions, NodeClient, NodeConnector, NodeError,
    PullImageOptions, PushImageOptions, RegistryAuth,
};

/// Operation kinds a mock can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Pull,
    Push,
    Remove,
    Import,
    Build,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Pull { repository: String },
    Push { name: String },
    Remove { name: String },
    Import { source: String },
    Build { name: String },
}

impl MockCall {
    pub fn op(&self) -> MockOp {
        match self {
            Self::Pull { .. } => MockOp::Pull,
            Self::Push { .. } => MockOp::Push,
            Self::Remove { .. } => MockOp::Remove,
            Self::Import { .. } => MockOp::Import,
            Self::Build { .. } => MockOp::Build,
        }
    }
}

/// Mock node client.
#[derive(Default)]
pub struct MockNodeClient {
    failures: Mutex<HashMap<MockOp, NodeError>>,
    calls: Mutex<Vec<MockCall>>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    started: AtomicUsize,
    completed: AtomicUsize,
    progress: Notify,
}

impl MockNodeClient {
    /// Create a mock that succeeds at everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose calls block until [`release`](Self::release) is
    /// called once per call.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Make every call take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Script `op` to fail with `error`.
    pub fn failing(self, op: MockOp, error: NodeError) -> Self {
        self.set_failure(op, error);
        self
    }

    pub fn set_failure(&self, op: MockOp, error: NodeError) {
        lock(&self.failures).insert(op, error);
    }

    /// Let `n` gated calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        lock(&self.calls).iter().filter(|c| c.op() == op).count()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` calls have started.
    pub async fn wait_started(&self, n: usize) {
        self.wait_until(|| self.started() >= n).await;
    }

    /// Wait until at least `n` calls have completed.
    pub async fn wait_completed(&self, n: usize) {
        self.wait_until(|| self.completed() >= n).await;
    }

    async fn wait_until(&self, done: impl Fn() -> bool) {
        loop {
            let notified = self.progress.notified();
            if done() {
                return;
            }
            notified.await;
        }
    }

    async fn handle(&self, call: MockCall) -> Result<(), NodeError> {
        let op = call.op();
        lock(&self.calls).push(call);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.progress.notify_waiters();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match lock(&self.failures).get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        };

        self.completed.fetch_add(1, Ordering::SeqCst);
        self.progress.notify_waiters();
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn pull_image(
        &self,
        opts: &PullImageOptions,
        _auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        info!(repository = %opts.repository, "[MOCK] Pulling image");
        self.handle(MockCall::Pull {
            repository: opts.repository.to_string(),
        })
        .await
    }

    async fn push_image(
        &self,
        opts: &PushImageOptions,
        _auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        info!(image = %opts.name, "[MOCK] Pushing image");
        self.handle(MockCall::Push {
            name: opts.name.to_string(),
        })
        .await
    }

    async fn remove_image(&self, name: &ImageName) -> Result<(), NodeError> {
        info!(image = %name, "[MOCK] Removing image");
        self.handle(MockCall::Remove {
            name: name.to_string(),
        })
        .await
    }

    async fn import_image(&self, opts: &ImportImageOptions) -> Result<(), NodeError> {
        info!(source = %opts.source, "[MOCK] Importing image");
        self.handle(MockCall::Import {
            source: opts.source.clone(),
        })
        .await
    }

    async fn build_image(&self, opts: &BuildImageOptions) -> Result<(), NodeError> {
        info!(image = %opts.name, "[MOCK] Building image");
        self.handle(MockCall::Build {
            name: opts.name.to_string(),
        })
        .await
    }
}

/// Connector handing out [`MockNodeClient`]s by address.
///
/// Unknown addresses get a fresh always-succeeding mock, kept so tests can
/// inspect it afterwards.
#[derive(Default)]
pub struct MockConnector {
    nodes: Mutex<HashMap<NodeAddress, Arc<MockNodeClient>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` as the mock for `address`.
    pub fn with_node(self, address: NodeAddress, client: MockNodeClient) -> Self {
        lock(&self.nodes).insert(address, Arc::new(client));
        self
    }

    /// The mock behind `address`, created on first use.
    pub fn node(&self, address: &NodeAddress) -> Arc<MockNodeClient> {
        Arc::clone(lock(&self.nodes).entry(address.clone()).or_default())
    }

    /// Number of `connect` calls served.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Total calls recorded across every node.
    pub fn total_calls(&self) -> usize {
        lock(&self.nodes).values().map(|n| n.calls().len()).sum()
    }
}

impl NodeConnector for MockConnector {
    fn connect(&self, address: &NodeAddress) -> Result<Arc<dyn NodeClient>, NodeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn NodeClient> = self.node(address);
        Ok(client)
    }
}

//! Image operation facade.
//!
//! Each operation resolves its target nodes, fans the node action out, and
//! then updates the location index from the aggregate outcome:
//!
//! | Operation | Nodes              | Policy           | Index update                    |
//! |-----------|--------------------|------------------|---------------------------------|
//! | remove    | holders of image   | caller's choice  | forget on success               |
//! | pull      | explicit list      | wait for all     | record each node *before* pull  |
//! | push      | first holder only  | single call      | none                            |
//! | import    | every registered   | first completion | none                            |
//! | build     | first registered   | single call      | replace holders on success      |
//!
//! Node tasks that first-completion operations leave running are kept in a
//! background set; a short-lived process calls
//! [`Cluster::wait_for_background`] before it exits.
//!
//! Pull's early write is optimistic: a failed pull can leave the index
//! pointing at a node that never got the image. Nothing reconciles that
//! entry later; a caller seeing a pull error should treat that node's index
//! entry as suspect.

use std::sync::Arc;

use imgfleet_id::{ImageName, NodeAddress, OperationId};
use imgfleet_index::LocationIndex;
use tracing::{info, instrument, warn};

use crate::error::ClusterError;
use crate::fanout::{run_on_nodes, run_on_nodes_in, BackgroundTasks, CompletionPolicy};
use crate::membership::ClusterMembership;
use crate::node::{
    BuildImageOptions, ImportImageOptions, NodeConnector, NodeErrorKind, NodeHandle,
    PullImageOptions, PushImageOptions, RegistryAuth,
};
use crate::resolver::{NodeSelector, Resolver};

/// Cluster-wide image operations.
#[derive(Clone)]
pub struct Cluster {
    index: Arc<dyn LocationIndex>,
    resolver: Resolver,
    background: BackgroundTasks,
}

impl Cluster {
    pub fn new(
        index: Arc<dyn LocationIndex>,
        membership: Arc<dyn ClusterMembership>,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        let resolver = Resolver::new(Arc::clone(&index), membership, connector);
        Self {
            index,
            resolver,
            background: BackgroundTasks::new(),
        }
    }

    /// Wait for node tasks still running from earlier first-completion
    /// operations. Returns how many were waited for.
    pub async fn wait_for_background(&self) -> usize {
        let pending = self.background.len();
        if pending > 0 {
            info!(pending, "Waiting for background node tasks");
        }
        self.background.wait().await
    }

    /// Remove an image from every node holding it.
    ///
    /// Nodes that no longer have the image are tolerated. Unless some node
    /// fails for another reason, the image is then dropped from the index,
    /// including under [`CompletionPolicy::FirstCompletion`] where the other
    /// nodes are still removing in the background.
    #[instrument(skip(self), fields(op_id = %OperationId::new(), image = %name))]
    pub async fn remove_image(
        &self,
        name: &ImageName,
        policy: CompletionPolicy,
    ) -> Result<(), ClusterError> {
        let nodes = self
            .resolver
            .resolve(&NodeSelector::HoldersOf(name.clone()))
            .await?;
        info!(nodes = nodes.len(), ?policy, "Removing image");

        let image = name.clone();
        let outcome = run_on_nodes_in(
            &self.background,
            move |node: NodeHandle| {
                let image = image.clone();
                async move { node.remove_image(&image).await }
            },
            Some(NodeErrorKind::ImageNotFound),
            policy,
            nodes,
        )
        .await?;

        self.index.forget_image(name).await?;
        info!(
            removed = outcome.values.len(),
            already_absent = outcome.ignored,
            "Image removed"
        );
        Ok(())
    }

    /// Remove an image and wait until every holder has finished.
    pub async fn remove_image_wait(&self, name: &ImageName) -> Result<(), ClusterError> {
        self.remove_image(name, CompletionPolicy::WaitForAll).await
    }

    /// Pull an image onto each of `nodes` and wait for all of them.
    ///
    /// Each node is recorded as a holder of `opts.repository` before its pull
    /// starts. A failure to write that record is logged and the pull goes
    /// ahead. Nodes reporting the image does not exist are tolerated.
    #[instrument(skip(self, opts, auth), fields(op_id = %OperationId::new(), image = %opts.repository))]
    pub async fn pull_image(
        &self,
        opts: PullImageOptions,
        auth: RegistryAuth,
        nodes: &[NodeAddress],
    ) -> Result<(), ClusterError> {
        let handles = self
            .resolver
            .resolve(&NodeSelector::Explicit(nodes.to_vec()))
            .await?;
        info!(nodes = handles.len(), "Pulling image");

        let index = Arc::clone(&self.index);
        let opts = Arc::new(opts);
        let auth = Arc::new(auth);
        let outcome = run_on_nodes(
            move |node: NodeHandle| {
                let index = Arc::clone(&index);
                let opts = Arc::clone(&opts);
                let auth = Arc::clone(&auth);
                async move {
                    if let Err(e) = index.record_holder(&opts.repository, node.address()).await {
                        warn!(node = %node.address(), error = %e, "Failed to record image holder");
                    }
                    node.pull_image(&opts, &auth).await
                }
            },
            Some(NodeErrorKind::ImageNotFound),
            CompletionPolicy::WaitForAll,
            handles,
        )
        .await?;

        info!(
            pulled = outcome.values.len(),
            not_found = outcome.ignored,
            "Image pulled"
        );
        Ok(())
    }

    /// Push an image from the first node known to hold it.
    ///
    /// Pushing the same image from several nodes would be redundant, so only
    /// one is used. An image whose record lists no nodes is a no-op.
    #[instrument(skip(self, opts, auth), fields(op_id = %OperationId::new(), image = %opts.name))]
    pub async fn push_image(
        &self,
        opts: PushImageOptions,
        auth: RegistryAuth,
    ) -> Result<(), ClusterError> {
        let holders = self
            .resolver
            .resolve(&NodeSelector::HoldersOf(opts.name.clone()))
            .await?;

        let Some(node) = holders.into_iter().next() else {
            info!("Image has no known holders, nothing to push");
            return Ok(());
        };

        info!(node = %node.address(), "Pushing image");
        node.push_image(&opts, &auth)
            .await
            .map_err(|source| ClusterError::Node {
                address: node.address().clone(),
                source,
            })?;

        info!(node = %node.address(), "Image pushed");
        Ok(())
    }

    /// Import an image on every registered node, returning after the first
    /// finishes. The index is not updated.
    #[instrument(skip(self, opts), fields(op_id = %OperationId::new(), repository = %opts.repository))]
    pub async fn import_image(&self, opts: ImportImageOptions) -> Result<(), ClusterError> {
        let nodes = self.resolver.resolve(&NodeSelector::AnyRegistered).await?;
        info!(nodes = nodes.len(), source = %opts.source, "Importing image");

        let opts = Arc::new(opts);
        run_on_nodes_in(
            &self.background,
            move |node: NodeHandle| {
                let opts = Arc::clone(&opts);
                async move { node.import_image(&opts).await }
            },
            Some(NodeErrorKind::ImageNotFound),
            CompletionPolicy::FirstCompletion,
            nodes,
        )
        .await?;

        Ok(())
    }

    /// Build an image on the first registered node.
    ///
    /// On success that node becomes the image's only recorded holder; any
    /// previously recorded holders are dropped.
    #[instrument(skip(self, opts), fields(op_id = %OperationId::new(), image = %opts.name))]
    pub async fn build_image(&self, opts: BuildImageOptions) -> Result<(), ClusterError> {
        let node = self
            .resolver
            .resolve(&NodeSelector::AnyRegistered)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClusterError::Resolution("no registered nodes to build on".into()))?;

        info!(node = %node.address(), remote = %opts.remote, "Building image");
        node.build_image(&opts)
            .await
            .map_err(|source| ClusterError::Node {
                address: node.address().clone(),
                source,
            })?;

        self.index
            .replace_holders(&opts.name, std::slice::from_ref(node.address()))
            .await?;
        info!(node = %node.address(), "Image built");
        Ok(())
    }

    /// Nodes currently recorded as holding `name`.
    pub async fn holders(&self, name: &ImageName) -> Result<Vec<NodeAddress>, ClusterError> {
        Ok(self.index.retrieve_holders(name).await?)
    }

    /// Every image with a record in the index.
    pub async fn images(&self) -> Result<Vec<ImageName>, ClusterError> {
        Ok(self.index.list_images().await?)
    }
}

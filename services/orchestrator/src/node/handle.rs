//! Addressable proxy for one node.

use std::sync::Arc;

use imgfleet_id::{ImageName, NodeAddress};
use tracing::debug;

use super::client::{
    BuildImageOptions, ImportImageOptions, NodeClient, NodeError, PullImageOptions,
    PushImageOptions, RegistryAuth,
};

/// A node address paired with a client able to reach it.
///
/// Handles are created by the resolver for a single fan-out call and moved
/// into that call's node task. They hold no state of their own.
#[derive(Clone)]
pub struct NodeHandle {
    address: NodeAddress,
    client: Arc<dyn NodeClient>,
}

impl NodeHandle {
    pub fn new(address: NodeAddress, client: Arc<dyn NodeClient>) -> Self {
        Self { address, client }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub async fn pull_image(
        &self,
        opts: &PullImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        debug!(node = %self.address, repository = %opts.repository, "Pulling image on node");
        self.client.pull_image(opts, auth).await
    }

    pub async fn push_image(
        &self,
        opts: &PushImageOptions,
        auth: &RegistryAuth,
    ) -> Result<(), NodeError> {
        debug!(node = %self.address, image = %opts.name, "Pushing image from node");
        self.client.push_image(opts, auth).await
    }

    pub async fn remove_image(&self, name: &ImageName) -> Result<(), NodeError> {
        debug!(node = %self.address, image = %name, "Removing image from node");
        self.client.remove_image(name).await
    }

    pub async fn import_image(&self, opts: &ImportImageOptions) -> Result<(), NodeError> {
        debug!(node = %self.address, source = %opts.source, "Importing image on node");
        self.client.import_image(opts).await
    }

    pub async fn build_image(&self, opts: &BuildImageOptions) -> Result<(), NodeError> {
        debug!(node = %self.address, image = %opts.name, "Building image on node");
        self.client.build_image(opts).await
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

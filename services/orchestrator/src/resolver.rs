//! Node resolution: turn a selection policy into concrete node handles.

use std::sync::Arc;

use imgfleet_id::{ImageName, NodeAddress};
use imgfleet_index::LocationIndex;
use tracing::debug;

use crate::error::ClusterError;
use crate::membership::ClusterMembership;
use crate::node::{NodeConnector, NodeHandle};

/// How to pick the nodes an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelector {
    /// Exactly these addresses, in this order. Duplicates are kept.
    Explicit(Vec<NodeAddress>),

    /// Every node the location index lists as holding the image.
    HoldersOf(ImageName),

    /// Every node currently registered with the cluster.
    AnyRegistered,
}

/// Resolves [`NodeSelector`]s against the index and the membership source.
#[derive(Clone)]
pub struct Resolver {
    index: Arc<dyn LocationIndex>,
    membership: Arc<dyn ClusterMembership>,
    connector: Arc<dyn NodeConnector>,
}

impl Resolver {
    pub fn new(
        index: Arc<dyn LocationIndex>,
        membership: Arc<dyn ClusterMembership>,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        Self {
            index,
            membership,
            connector,
        }
    }

    /// Resolve `selector` into handles, preserving the selector's order.
    ///
    /// `HoldersOf` an unknown image fails with the index's not-found error.
    /// An empty result is not an error; callers decide whether they need a
    /// node.
    pub async fn resolve(&self, selector: &NodeSelector) -> Result<Vec<NodeHandle>, ClusterError> {
        let addresses = match selector {
            NodeSelector::Explicit(addresses) => addresses.clone(),
            NodeSelector::HoldersOf(image) => self.index.retrieve_holders(image).await?,
            NodeSelector::AnyRegistered => self.membership.list_nodes().await?,
        };

        debug!(?selector, count = addresses.len(), "Resolved nodes");
        self.handles(addresses)
    }

    fn handles(&self, addresses: Vec<NodeAddress>) -> Result<Vec<NodeHandle>, ClusterError> {
        addresses
            .into_iter()
            .map(|address| match self.connector.connect(&address) {
                Ok(client) => Ok(NodeHandle::new(address, client)),
                Err(source) => Err(ClusterError::Node { address, source }),
            })
            .collect()
    }
}

//! Cluster membership: which nodes exist right now.

use async_trait::async_trait;
use imgfleet_id::NodeAddress;

use crate::error::ClusterError;

/// Source of the registered node list.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// All registered nodes, in a stable order. An empty list is valid.
    async fn list_nodes(&self) -> Result<Vec<NodeAddress>, ClusterError>;
}

/// Fixed node list, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    nodes: Vec<NodeAddress>,
}

impl StaticMembership {
    pub fn new(nodes: Vec<NodeAddress>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl ClusterMembership for StaticMembership {
    async fn list_nodes(&self) -> Result<Vec<NodeAddress>, ClusterError> {
        Ok(self.nodes.clone())
    }
}

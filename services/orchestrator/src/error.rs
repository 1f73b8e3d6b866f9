//! Orchestrator error types.

use imgfleet_id::NodeAddress;
use imgfleet_index::IndexError;
use thiserror::Error;

use crate::node::NodeError;

/// Errors returned by the resolver, the fan-out executor, and the facade.
///
/// Tolerated node failures never show up here; they are counted in the
/// fan-out outcome instead.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Location index failure, including an image with no record.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A node failed with a non-tolerated error.
    #[error("node {address}: {source}")]
    Node {
        address: NodeAddress,
        #[source]
        source: NodeError,
    },

    /// A selector that needs at least one node produced none.
    #[error("no nodes available: {0}")]
    Resolution(String),

    /// A node task ended without reporting (panicked).
    #[error("task for node {address} failed: {message}")]
    TaskFailed {
        address: NodeAddress,
        message: String,
    },
}

impl ClusterError {
    /// Returns true if the error is an index lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Index(e) if e.is_not_found())
    }

    /// The node failure behind this error, if any.
    pub fn node_error(&self) -> Option<&NodeError> {
        match self {
            Self::Node { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Address of the node that caused this error, if any.
    pub fn node_address(&self) -> Option<&NodeAddress> {
        match self {
            Self::Node { address, .. } | Self::TaskFailed { address, .. } => Some(address),
            _ => None,
        }
    }
}

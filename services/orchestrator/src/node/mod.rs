//! Node transport: the contract, the handle the orchestrator passes around,
//! and two implementations.
//!
//! - `client`: [`NodeClient`] / [`NodeConnector`] traits and option types
//! - `handle`: [`NodeHandle`], one address plus its client
//! - `docker`: Docker Engine HTTP API transport
//! - `mock`: in-process transport for tests and dry runs

mod client;
mod docker;
mod handle;
mod mock;

pub use client::{
    BuildImageOptions, ImportImageOptions, NodeClient, NodeConnector, NodeError, NodeErrorKind,
    PullImageOptions, PushImageOptions, RegistryAuth,
};
pub use docker::{DockerConnector, DockerNodeClient};
pub use handle::NodeHandle;
pub use mock::{MockCall, MockConnector, MockNodeClient, MockOp};

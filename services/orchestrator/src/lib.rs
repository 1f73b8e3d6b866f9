//! imgfleet orchestrator library
//!
//! Runs container-image operations (pull, push, remove, import, build)
//! across a set of execution nodes and keeps a location index of which
//! nodes hold which images.
//!
//! ## Architecture
//!
//! ```text
//! Cluster (facade)
//! ├── Resolver        selector -> node handles (index, membership, connector)
//! ├── run_on_nodes    one task per node, completion policy, ignorable errors
//! └── LocationIndex   updated from the aggregate outcome
//! ```
//!
//! ## Modules
//!
//! - `cluster`: the five image operations
//! - `fanout`: concurrent per-node execution and aggregation
//! - `resolver`: node selection policies
//! - `membership`: registered node source
//! - `node`: node transport contract, Docker and mock transports
//! - `config`: environment configuration for the binary
//! - `cli`: the `imgfleet` command line

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fanout;
pub mod membership;
pub mod node;
pub mod resolver;

// Re-export commonly used types
pub use cluster::Cluster;
pub use error::ClusterError;
pub use fanout::{run_on_nodes, run_on_nodes_in, BackgroundTasks, CompletionPolicy, FanOutOutcome};
pub use membership::{ClusterMembership, StaticMembership};
pub use resolver::{NodeSelector, Resolver};

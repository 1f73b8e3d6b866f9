//! # imgfleet-index
//!
//! The location index records which nodes currently hold which images.
//!
//! ## Contract
//!
//! - `retrieve_holders` fails with [`IndexError::NotFound`] when the image has
//!   no record.
//! - `record_holder` and `forget_image` are idempotent.
//! - A node address appears at most once per image.
//! - Every mutation of one image is atomic: a concurrent reader sees either
//!   the old holder set or the new one, never a mix.
//!
//! There is no ordering guarantee across images and no locking beyond what
//! each backend provides per key, so several orchestrator instances may share
//! a backend.
//!
//! ## Backends
//!
//! - [`InMemoryLocationIndex`]: process-local, for tests and dry runs
//! - [`SqliteLocationIndex`]: durable, one row per (image, node) pair

mod error;
mod memory;
mod sqlite;

use async_trait::async_trait;
use imgfleet_id::{ImageName, NodeAddress};

pub use error::IndexError;
pub use memory::InMemoryLocationIndex;
pub use sqlite::SqliteLocationIndex;

/// Storage backend for the image location index.
#[async_trait]
pub trait LocationIndex: Send + Sync {
    /// Return the nodes known to hold `image`, in the order they were recorded.
    async fn retrieve_holders(&self, image: &ImageName) -> Result<Vec<NodeAddress>, IndexError>;

    /// Record `address` as a holder of `image`. No-op if already recorded.
    async fn record_holder(&self, image: &ImageName, address: &NodeAddress)
        -> Result<(), IndexError>;

    /// Drop every record of `image`. No-op if there is none.
    async fn forget_image(&self, image: &ImageName) -> Result<(), IndexError>;

    /// Replace the holder set of `image` with `addresses` in one step.
    ///
    /// Duplicates in `addresses` collapse to a single entry.
    async fn replace_holders(
        &self,
        image: &ImageName,
        addresses: &[NodeAddress],
    ) -> Result<(), IndexError>;

    /// List every image that currently has a record, sorted by name.
    async fn list_images(&self) -> Result<Vec<ImageName>, IndexError>;
}

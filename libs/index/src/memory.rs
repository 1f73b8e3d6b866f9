//! Process-local location index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use imgfleet_id::{ImageName, NodeAddress};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{IndexError, LocationIndex};

/// Location index held in memory behind a single lock.
///
/// Every mutation takes the write lock for its whole duration, which makes
/// per-image updates atomic. Unlike the SQLite backend this one can hold an
/// image with an empty holder set, which is how a record that exists but
/// names no nodes is represented.
#[derive(Debug, Default)]
pub struct InMemoryLocationIndex {
    records: RwLock<BTreeMap<ImageName, Vec<NodeAddress>>>,
}

impl InMemoryLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index pre-populated with `records`.
    ///
    /// Holder lists are de-duplicated, keeping first occurrence order.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (ImageName, Vec<NodeAddress>)>,
    {
        let records = records
            .into_iter()
            .map(|(image, holders)| (image, dedup(holders.iter())))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of images with a record.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn dedup<'a>(addresses: impl Iterator<Item = &'a NodeAddress>) -> Vec<NodeAddress> {
    let mut out: Vec<NodeAddress> = Vec::new();
    for address in addresses {
        if !out.contains(address) {
            out.push(address.clone());
        }
    }
    out
}

#[async_trait]
impl LocationIndex for InMemoryLocationIndex {
    async fn retrieve_holders(&self, image: &ImageName) -> Result<Vec<NodeAddress>, IndexError> {
        self.records
            .read()
            .await
            .get(image)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(image.to_string()))
    }

    async fn record_holder(
        &self,
        image: &ImageName,
        address: &NodeAddress,
    ) -> Result<(), IndexError> {
        let mut records = self.records.write().await;
        let holders = records.entry(image.clone()).or_default();
        if !holders.contains(address) {
            holders.push(address.clone());
            debug!(image = %image, node = %address, "Recorded image holder");
        }
        Ok(())
    }

    async fn forget_image(&self, image: &ImageName) -> Result<(), IndexError> {
        if self.records.write().await.remove(image).is_some() {
            debug!(image = %image, "Forgot image");
        }
        Ok(())
    }

    async fn replace_holders(
        &self,
        image: &ImageName,
        addresses: &[NodeAddress],
    ) -> Result<(), IndexError> {
        let holders = dedup(addresses.iter());
        self.records.write().await.insert(image.clone(), holders);
        debug!(image = %image, count = addresses.len(), "Replaced image holders");
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageName>, IndexError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(s: &str) -> ImageName {
        ImageName::parse(s).unwrap()
    }

    fn node(s: &str) -> NodeAddress {
        NodeAddress::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_unknown_image_is_not_found() {
        let index = InMemoryLocationIndex::new();
        let err = index.retrieve_holders(&image("busybox")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_record_holder_is_idempotent() {
        let index = InMemoryLocationIndex::new();
        index.record_holder(&image("busybox"), &node("n1")).await.unwrap();
        index.record_holder(&image("busybox"), &node("n2")).await.unwrap();
        index.record_holder(&image("busybox"), &node("n1")).await.unwrap();

        let holders = index.retrieve_holders(&image("busybox")).await.unwrap();
        assert_eq!(holders, vec![node("n1"), node("n2")]);
    }

    #[tokio::test]
    async fn test_forget_image_is_idempotent() {
        let index = InMemoryLocationIndex::new();
        index.record_holder(&image("busybox"), &node("n1")).await.unwrap();

        index.forget_image(&image("busybox")).await.unwrap();
        index.forget_image(&image("busybox")).await.unwrap();

        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_with_records_keeps_empty_holder_sets() {
        let index = InMemoryLocationIndex::with_records([
            (image("orphan"), vec![]),
            (image("dup"), vec![node("n1"), node("n1"), node("n2")]),
        ]);

        assert!(index.retrieve_holders(&image("orphan")).await.unwrap().is_empty());
        assert_eq!(
            index.retrieve_holders(&image("dup")).await.unwrap(),
            vec![node("n1"), node("n2")]
        );
        assert_eq!(index.len().await, 2);
    }
}

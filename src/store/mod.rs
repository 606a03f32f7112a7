//! Remote object storage for uploaded images
//!
//! The pipeline only needs a narrow capability surface from the backend:
//! put bytes, list by prefix, resolve a public URL, delete, and list
//! buckets. [`S3ObjectStore`] provides it over any S3-compatible endpoint.

pub mod client;
pub mod mock;

pub use client::S3ObjectStore;
pub use mock::MockObjectStore;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub content_type: String,
    pub cache_control: String,
    /// `false` turns an existing key into a write error instead of an overwrite.
    pub upsert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &StoreOptions,
    ) -> Result<()>;
    async fn list_objects(&self, bucket: &str, search_prefix: &str) -> Result<Vec<StoredObject>>;
    fn public_url(&self, bucket: &str, key: &str) -> String;
    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;
}

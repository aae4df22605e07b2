use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{PortalError, Result};

/// External blob storage backing media records. The production implementation
/// lives in the service crate; this trait is the seam the media registry works
/// against.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes and returns an opaque external reference.
    async fn upload(&self, name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String>;

    async fn download(&self, external_ref: &str) -> Result<Vec<u8>>;

    async fn delete(&self, external_ref: &str) -> Result<()>;
}

/// In-memory implementation of BlobStore, used in tests and when no remote
/// store is configured.
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: DashMap::new(),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, _name: &str, _mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        let external_ref = Uuid::new_v4().to_string();
        self.blobs.insert(external_ref.clone(), bytes);
        Ok(external_ref)
    }

    async fn download(&self, external_ref: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(external_ref)
            .map(|entry| entry.clone())
            .ok_or_else(|| PortalError::Blob(format!("no such blob: {external_ref}")))
    }

    async fn delete(&self, external_ref: &str) -> Result<()> {
        self.blobs
            .remove(external_ref)
            .map(|_| ())
            .ok_or_else(|| PortalError::Blob(format!("no such blob: {external_ref}")))
    }
}

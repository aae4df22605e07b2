use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::error::{PortalError, Result};
use crate::model::{MediaKind, MediaRecord};
use crate::users::{UserStore, require_patient};

/// Trait for storing and retrieving media records
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn insert(&self, record: MediaRecord) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>>;
    /// All records owned by a patient, creation time descending.
    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MediaRecord>>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Outcome of a registry delete. Remote release is best effort, so a failure
/// there surfaces as a warning instead of an error.
#[derive(Debug)]
pub struct MediaDeletion {
    pub warning: Option<String>,
}

/// Registry of uploaded artifacts. Records live in a [`MediaStore`]; the bytes
/// themselves live behind a [`BlobStore`].
#[derive(Clone)]
pub struct MediaRegistry {
    store: Arc<dyn MediaStore>,
    blobs: Arc<dyn BlobStore>,
    users: Arc<dyn UserStore>,
}

impl MediaRegistry {
    pub fn new(store: Arc<dyn MediaStore>, blobs: Arc<dyn BlobStore>, users: Arc<dyn UserStore>) -> Self {
        Self { store, blobs, users }
    }

    /// Records an uploaded artifact. The owner must be an existing
    /// patient-role user.
    pub async fn register(
        &self,
        owner_id: Uuid,
        file_name: &str,
        kind: MediaKind,
        external_ref: &str,
        transcript: Option<String>,
    ) -> Result<MediaRecord> {
        require_patient(self.users.as_ref(), owner_id).await?;

        let record = MediaRecord {
            id: Uuid::new_v4(),
            patient_id: owner_id,
            file_name: file_name.to_string(),
            file_type: kind,
            external_ref: external_ref.to_string(),
            transcript,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone()).await?;

        info!(media_id = %record.id, patient_id = %owner_id, kind = kind.as_str(), "registered media record");
        Ok(record)
    }

    /// Removes a record and asks the external store to release the backing
    /// blob. Local deletion proceeds even when the remote release fails; the
    /// failure comes back as a warning on the outcome.
    pub async fn delete(&self, media_id: Uuid) -> Result<MediaDeletion> {
        let record = self
            .store
            .get(media_id)
            .await?
            .ok_or(PortalError::MediaNotFound(media_id))?;

        let warning = match self.blobs.delete(&record.external_ref).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    media_id = %media_id,
                    external_ref = %record.external_ref,
                    error = %err,
                    "remote blob release failed, removing local record anyway"
                );
                Some(format!("backing blob was not released: {err}"))
            }
        };

        self.store.delete(media_id).await?;
        Ok(MediaDeletion { warning })
    }

    pub async fn get(&self, media_id: Uuid) -> Result<MediaRecord> {
        self.store
            .get(media_id)
            .await?
            .ok_or(PortalError::MediaNotFound(media_id))
    }

    pub async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MediaRecord>> {
        require_patient(self.users.as_ref(), patient_id).await?;
        self.store.list_for_patient(patient_id).await
    }
}

/// In-memory implementation of MediaStore
pub struct InMemoryMediaStore {
    records: DashMap<Uuid, MediaRecord>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for InMemoryMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaStore for InMemoryMediaStore {
    async fn insert(&self, record: MediaRecord) -> Result<()> {
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>> {
        Ok(self.records.get(&id).map(|entry| entry.clone()))
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MediaRecord>> {
        let mut records: Vec<MediaRecord> = self
            .records
            .iter()
            .filter(|entry| entry.patient_id == patient_id)
            .map(|entry| entry.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.records.remove(&id);
        Ok(())
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use portal_core::{BlobStore, PortalError, Result};

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files?uploadType=media";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Google Drive implementation of [`BlobStore`]. A thin wrapper over the
/// Drive v3 REST API: content goes up as a media upload, then a metadata patch
/// sets the display name and parent folder. The external reference is the
/// Drive file id.
pub struct DriveStore {
    http: Client,
    access_token: String,
    folder_id: Option<String>,
}

impl DriveStore {
    pub fn new(access_token: impl Into<String>, folder_id: Option<String>) -> Self {
        Self {
            http: Client::new(),
            access_token: access_token.into(),
            folder_id,
        }
    }
}

#[async_trait]
impl BlobStore for DriveStore {
    async fn upload(&self, name: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        let response = self
            .http
            .post(UPLOAD_URL)
            .bearer_auth(&self.access_token)
            .header("Content-Type", mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PortalError::Blob(format!(
                "drive upload failed: {}",
                response.status()
            )));
        }

        let created: Value = response
            .json()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;
        let file_id = created["id"]
            .as_str()
            .ok_or_else(|| PortalError::Blob("no file id in drive upload response".to_string()))?
            .to_string();

        let mut request = self
            .http
            .patch(format!("{FILES_URL}/{file_id}"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "name": name }));
        if let Some(folder) = &self.folder_id {
            request = request.query(&[("addParents", folder.as_str())]);
        }
        let response = request
            .send()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PortalError::Blob(format!(
                "drive metadata update failed: {}",
                response.status()
            )));
        }

        info!(file_id = %file_id, name = %name, "uploaded blob to drive");
        Ok(file_id)
    }

    async fn download(&self, external_ref: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(format!("{FILES_URL}/{external_ref}"))
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PortalError::Blob(format!(
                "drive download failed: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, external_ref: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{FILES_URL}/{external_ref}"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| PortalError::Blob(err.to_string()))?;

        if !response.status().is_success() {
            return Err(PortalError::Blob(format!(
                "drive delete failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use portal_core::MediaRecord;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Opaque session id chosen by the client; a fresh one is generated when
    /// absent. The first message for a given id creates the session.
    pub session_id: Option<String>,
    pub patient_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionRequest {
    pub session_id: String,
    pub doctor_notes: String,
    #[serde(default = "default_follow_up_days")]
    pub follow_up_days: u32,
}

fn default_follow_up_days() -> u32 {
    7
}

#[derive(Debug, Serialize)]
pub struct PrescriptionResponse {
    pub message: String,
    pub media_id: Uuid,
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct MediaUploadResponse {
    pub media: MediaRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMediaResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

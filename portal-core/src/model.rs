use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PortalError;
use crate::summary::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(PortalError::Storage(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Patient,
    Assistant,
}

/// One message in a chat session, attributed to the patient or the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub sender: Speaker,
    pub text: String,
}

impl Turn {
    pub fn patient(text: impl Into<String>) -> Self {
        Self {
            sender: Speaker::Patient,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// A patient's conversation with the assistant: an append-only turn log plus
/// an optional AI-produced summary. Created on the first message of a session,
/// never deleted by normal flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub patient_id: Uuid,
    pub messages: Vec<Turn>,
    pub summary: Option<Summary>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    /// Triage score for clinician review. Sessions without a summary, or with
    /// a summary whose priority field is unusable, score 0.
    pub fn priority_score(&self) -> i64 {
        self.summary
            .as_ref()
            .map(Summary::priority_score)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Document,
    Pdf,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Document => "document",
            MediaKind::Pdf => "pdf",
        }
    }

    /// Content type used when proxying the backing blob to a client.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/webm",
            MediaKind::Image => "image/jpeg",
            MediaKind::Pdf => "application/pdf",
            MediaKind::Document => "application/octet-stream",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "image" => Ok(MediaKind::Image),
            "document" => Ok(MediaKind::Document),
            "pdf" => Ok(MediaKind::Pdf),
            other => Err(PortalError::Storage(format!("unknown media kind: {other}"))),
        }
    }
}

/// An uploaded artifact (audio note, scanned record, prescription document)
/// whose bytes live in external blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub file_name: String,
    pub file_type: MediaKind,
    pub external_ref: String,
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
}

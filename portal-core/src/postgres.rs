use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::media::MediaStore;
use crate::model::{ChatSession, MediaRecord, NewUser, Turn, User};
use crate::session::SessionStore;
use crate::summary::Summary;
use crate::users::UserStore;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        full_name TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        session_id TEXT PRIMARY KEY,
        patient_id UUID NOT NULL REFERENCES users (id),
        messages JSONB NOT NULL,
        summary JSONB,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS chat_sessions_patient_created_idx
        ON chat_sessions (patient_id, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS media_records (
        id UUID PRIMARY KEY,
        patient_id UUID NOT NULL REFERENCES users (id),
        file_name TEXT NOT NULL,
        file_type TEXT NOT NULL,
        external_ref TEXT NOT NULL,
        transcript TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS media_records_patient_created_idx
        ON media_records (patient_id, created_at DESC)",
];

/// PostgreSQL implementation of the user, session and media stores, sharing
/// one connection pool. Message logs and summaries are JSONB values replaced
/// wholesale on write.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects and creates the schema if it does not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    async fn require_patient(&self, id: Uuid) -> Result<()> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match role.as_deref() {
            Some("patient") => Ok(()),
            _ => Err(PortalError::UnknownPatient(id)),
        }
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        role: role.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<ChatSession> {
    let messages: Value = row.try_get("messages")?;
    let summary: Option<Value> = row.try_get("summary")?;
    Ok(ChatSession {
        session_id: row.try_get("session_id")?,
        patient_id: row.try_get("patient_id")?,
        messages: serde_json::from_value(messages)?,
        summary: summary.map(serde_json::from_value::<Summary>).transpose()?,
        created_at: row.try_get("created_at")?,
    })
}

fn media_from_row(row: &PgRow) -> Result<MediaRecord> {
    let file_type: String = row.try_get("file_type")?;
    Ok(MediaRecord {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        file_name: row.try_get("file_name")?,
        file_type: file_type.parse()?,
        external_ref: row.try_get("external_ref")?,
        transcript: row.try_get("transcript")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create(&self, new_user: NewUser) -> Result<User> {
        if self.find_by_email(&new_user.email).await?.is_some() {
            return Err(PortalError::DuplicateEmail(new_user.email));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            full_name: new_user.full_name,
            role: new_user.role,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, email, full_name, role, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, full_name, role, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row =
            sqlx::query("SELECT id, email, full_name, role, created_at FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_patients(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, full_name, role, created_at FROM users
             WHERE role = 'patient' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn append_turn(&self, session_id: &str, patient_id: Uuid, turn: Turn) -> Result<ChatSession> {
        match SessionStore::get(self, session_id).await? {
            Some(mut session) => {
                if session.patient_id != patient_id {
                    return Err(PortalError::SessionNotFound(session_id.to_string()));
                }
                session.messages.push(turn);
                sqlx::query("UPDATE chat_sessions SET messages = $2 WHERE session_id = $1")
                    .bind(session_id)
                    .bind(serde_json::to_value(&session.messages)?)
                    .execute(&self.pool)
                    .await?;
                Ok(session)
            }
            None => {
                self.require_patient(patient_id).await?;
                let session = ChatSession {
                    session_id: session_id.to_string(),
                    patient_id,
                    messages: vec![turn],
                    summary: None,
                    created_at: Utc::now(),
                };
                sqlx::query(
                    "INSERT INTO chat_sessions (session_id, patient_id, messages, summary, created_at)
                     VALUES ($1, $2, $3, NULL, $4)",
                )
                .bind(&session.session_id)
                .bind(session.patient_id)
                .bind(serde_json::to_value(&session.messages)?)
                .bind(session.created_at)
                .execute(&self.pool)
                .await?;
                Ok(session)
            }
        }
    }

    async fn attach_summary(&self, session_id: &str, summary: Summary) -> Result<()> {
        let result = sqlx::query("UPDATE chat_sessions SET summary = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(serde_json::to_value(&summary)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PortalError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT session_id, patient_id, messages, summary, created_at
             FROM chat_sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT session_id, patient_id, messages, summary, created_at
             FROM chat_sessions WHERE patient_id = $1 ORDER BY created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }
}

#[async_trait]
impl MediaStore for PostgresStore {
    async fn insert(&self, record: MediaRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO media_records (id, patient_id, file_name, file_type, external_ref, transcript, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.patient_id)
        .bind(&record.file_name)
        .bind(record.file_type.as_str())
        .bind(&record.external_ref)
        .bind(&record.transcript)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaRecord>> {
        let row = sqlx::query(
            "SELECT id, patient_id, file_name, file_type, external_ref, transcript, created_at
             FROM media_records WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(media_from_row).transpose()
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<MediaRecord>> {
        let rows = sqlx::query(
            "SELECT id, patient_id, file_name, file_type, external_ref, transcript, created_at
             FROM media_records WHERE patient_id = $1 ORDER BY created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(media_from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM media_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

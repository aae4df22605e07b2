use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::model::{ChatSession, Turn};
use crate::summary::Summary;
use crate::users::{UserStore, require_patient};

/// Trait for storing and retrieving chat sessions.
///
/// Message logs and summaries are immutable values replaced wholesale on
/// write; nothing mutates a stored turn in place.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Appends a turn, idempotently creating the session on the first call for
    /// this session id. The patient id is validated on creation and must match
    /// the owner on subsequent appends (a mismatch reads as not-found, since
    /// that session does not exist for that patient).
    async fn append_turn(&self, session_id: &str, patient_id: Uuid, turn: Turn) -> Result<ChatSession>;

    /// Attaches a summary, replacing any existing one.
    async fn attach_summary(&self, session_id: &str, summary: Summary) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>>;

    /// All sessions for a patient, creation time descending.
    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<ChatSession>>;
}

/// In-memory implementation of SessionStore
pub struct InMemorySessionStore {
    sessions: DashMap<String, ChatSession>,
    users: Arc<dyn UserStore>,
}

impl InMemorySessionStore {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            users,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_turn(&self, session_id: &str, patient_id: Uuid, turn: Turn) -> Result<ChatSession> {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if entry.patient_id != patient_id {
                return Err(PortalError::SessionNotFound(session_id.to_string()));
            }
            entry.messages.push(turn);
            return Ok(entry.clone());
        }

        require_patient(self.users.as_ref(), patient_id).await?;
        let session = ChatSession {
            session_id: session_id.to_string(),
            patient_id,
            messages: vec![turn],
            summary: None,
            created_at: Utc::now(),
        };
        self.sessions.insert(session_id.to_string(), session.clone());
        info!(session_id = %session_id, patient_id = %patient_id, "created chat session");
        Ok(session)
    }

    async fn attach_summary(&self, session_id: &str, summary: Summary) -> Result<()> {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) => {
                entry.summary = Some(summary);
                Ok(())
            }
            None => Err(PortalError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.get(session_id).map(|entry| entry.clone()))
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.patient_id == patient_id)
            .map(|entry| entry.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewUser, Role, Speaker};
    use crate::users::InMemoryUserStore;

    async fn store_with_patient() -> (InMemorySessionStore, Uuid) {
        let users = Arc::new(InMemoryUserStore::new());
        let patient = users
            .create(NewUser {
                email: "p@example.com".to_string(),
                full_name: "Test Patient".to_string(),
                role: Role::Patient,
            })
            .await
            .unwrap();
        (InMemorySessionStore::new(users), patient.id)
    }

    #[tokio::test]
    async fn first_append_creates_the_session() {
        let (store, patient_id) = store_with_patient().await;

        let session = store
            .append_turn("s1", patient_id, Turn::patient("hello"))
            .await
            .unwrap();

        assert_eq!(session.messages.len(), 1);
        assert!(session.summary.is_none());
        assert!(store.get("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn appends_never_reorder_prior_turns() {
        let (store, patient_id) = store_with_patient().await;

        store.append_turn("s1", patient_id, Turn::patient("one")).await.unwrap();
        store.append_turn("s1", patient_id, Turn::assistant("two")).await.unwrap();
        let session = store
            .append_turn("s1", patient_id, Turn::patient("three"))
            .await
            .unwrap();

        let texts: Vec<&str> = session.messages.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(session.messages[0].sender, Speaker::Patient);
        assert_eq!(session.messages[1].sender, Speaker::Assistant);
    }

    #[tokio::test]
    async fn unknown_patient_cannot_open_a_session() {
        let (store, _) = store_with_patient().await;

        let err = store
            .append_turn("s1", Uuid::new_v4(), Turn::patient("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::UnknownPatient(_)));
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn appending_to_another_patients_session_reads_as_not_found() {
        let (store, patient_id) = store_with_patient().await;
        store.append_turn("s1", patient_id, Turn::patient("mine")).await.unwrap();

        let err = store
            .append_turn("s1", Uuid::new_v4(), Turn::patient("not mine"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn attach_summary_overwrites_never_merges() {
        let (store, patient_id) = store_with_patient().await;
        store.append_turn("s1", patient_id, Turn::patient("hello")).await.unwrap();

        let first = Summary::from_reply(r#"{"priority_score": 3, "symptoms": "cough"}"#).unwrap();
        store.attach_summary("s1", first).await.unwrap();

        let second = Summary::from_reply(r#"{"priority_score": 8}"#).unwrap();
        store.attach_summary("s1", second.clone()).await.unwrap();

        let session = store.get("s1").await.unwrap().unwrap();
        let summary = session.summary.unwrap();
        assert_eq!(summary.priority_score(), 8);
        // Replaced wholesale: the first summary's symptoms are gone.
        assert_eq!(summary, second);
    }

    #[tokio::test]
    async fn attach_summary_to_unknown_session_is_not_found() {
        let (store, _) = store_with_patient().await;
        let summary = Summary::from_reply(r#"{"priority_score": 5}"#).unwrap();

        let err = store.attach_summary("missing", summary).await.unwrap_err();
        assert!(matches!(err, PortalError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn list_is_creation_time_descending() {
        let (store, patient_id) = store_with_patient().await;

        store.append_turn("first", patient_id, Turn::patient("a")).await.unwrap();
        store.append_turn("second", patient_id, Turn::patient("b")).await.unwrap();
        store.append_turn("third", patient_id, Turn::patient("c")).await.unwrap();

        let sessions = store.list_for_patient(patient_id).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn list_only_returns_the_patients_sessions() {
        let (store, patient_id) = store_with_patient().await;
        store.append_turn("mine", patient_id, Turn::patient("a")).await.unwrap();

        let sessions = store.list_for_patient(Uuid::new_v4()).await.unwrap();
        assert!(sessions.is_empty());
    }
}

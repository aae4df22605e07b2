pub mod blob;
pub mod error;
pub mod gateway;
pub mod media;
pub mod model;
pub mod postgres;
pub mod session;
pub mod summary;
pub mod triage;
pub mod users;

// Re-export commonly used types
pub use blob::{BlobStore, InMemoryBlobStore};
pub use error::{PortalError, Result};
pub use gateway::{AiGateway, GatewayError, MAX_GATEWAY_ATTEMPTS, SERVICE_BUSY_REPLY, reply_with_retry};
pub use media::{InMemoryMediaStore, MediaDeletion, MediaRegistry, MediaStore};
pub use model::{ChatSession, MediaKind, MediaRecord, NewUser, Role, Speaker, Turn, User};
pub use postgres::PostgresStore;
pub use session::{InMemorySessionStore, SessionStore};
pub use summary::Summary;
pub use triage::rank;
pub use users::{InMemoryUserStore, UserStore, require_patient};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn chat_summary_triage_flow() {
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let sessions = InMemorySessionStore::new(users.clone());

        let patient = users
            .create(NewUser {
                email: "p@example.com".to_string(),
                full_name: "Test Patient".to_string(),
                role: Role::Patient,
            })
            .await
            .unwrap();

        // Two sessions; the older one gets summarized with a high priority.
        sessions
            .append_turn("older", patient.id, Turn::patient("I have chest pain"))
            .await
            .unwrap();
        sessions
            .append_turn("older", patient.id, Turn::assistant("How long has this been going on?"))
            .await
            .unwrap();
        sessions
            .append_turn("newer", patient.id, Turn::patient("My ankle itches"))
            .await
            .unwrap();

        let reply = "```json\n{\"chief_complaint\": \"chest pain\", \"priority_score\": 9}\n```";
        let summary = Summary::from_reply(reply).unwrap();
        sessions.attach_summary("older", summary).await.unwrap();

        let listed = sessions.list_for_patient(patient.id).await.unwrap();
        assert_eq!(listed[0].session_id, "newer");

        let ranked = rank(listed);
        assert_eq!(ranked[0].session_id, "older");
        assert_eq!(ranked[0].priority_score(), 9);
        assert_eq!(ranked[1].priority_score(), 0);
    }

    #[tokio::test]
    async fn media_round_trip() {
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let blobs: Arc<InMemoryBlobStore> = Arc::new(InMemoryBlobStore::new());
        let registry = MediaRegistry::new(Arc::new(InMemoryMediaStore::new()), blobs.clone(), users.clone());

        let patient = users
            .create(NewUser {
                email: "p@example.com".to_string(),
                full_name: "Test Patient".to_string(),
                role: Role::Patient,
            })
            .await
            .unwrap();

        let external_ref = blobs
            .upload("voice.webm", "audio/webm", b"bytes".to_vec())
            .await
            .unwrap();
        let record = registry
            .register(patient.id, "voice.webm", MediaKind::Audio, &external_ref, Some("hi".into()))
            .await
            .unwrap();

        assert_eq!(blobs.download(&external_ref).await.unwrap(), b"bytes");
        let outcome = registry.delete(record.id).await.unwrap();
        assert!(outcome.warning.is_none());
    }
}

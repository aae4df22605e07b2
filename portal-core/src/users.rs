use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::model::{NewUser, Role, User};

/// Trait for storing and retrieving portal users
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User>;
    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_patients(&self) -> Result<Vec<User>>;
}

/// Resolves an id that must belong to an existing patient-role user. Chat
/// sessions and media records may only reference patients; anything else is a
/// referential error reported as not-found.
pub async fn require_patient(users: &dyn UserStore, id: Uuid) -> Result<User> {
    match users.get(id).await? {
        Some(user) if user.role == Role::Patient => Ok(user),
        _ => Err(PortalError::UnknownPatient(id)),
    }
}

/// In-memory implementation of UserStore
pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
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
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.clone()))
    }

    async fn list_patients(&self) -> Result<Vec<User>> {
        let mut patients: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.role == Role::Patient)
            .map(|entry| entry.clone())
            .collect();
        patients.sort_by_key(|user| user.created_at);
        Ok(patients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            full_name: "Test Patient".to_string(),
            role: Role::Patient,
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let store = InMemoryUserStore::new();
        let user = store.create(patient("a@example.com")).await.unwrap();

        assert_eq!(store.get(user.id).await.unwrap().unwrap().email, "a@example.com");
        assert!(store.find_by_email("a@example.com").await.unwrap().is_some());
        assert!(store.find_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryUserStore::new();
        store.create(patient("a@example.com")).await.unwrap();

        let err = store.create(patient("a@example.com")).await.unwrap_err();
        assert!(matches!(err, PortalError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn list_patients_excludes_other_roles() {
        let store = InMemoryUserStore::new();
        store.create(patient("p@example.com")).await.unwrap();
        store
            .create(NewUser {
                email: "d@example.com".to_string(),
                full_name: "Dr Smith".to_string(),
                role: Role::Doctor,
            })
            .await
            .unwrap();

        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].email, "p@example.com");
    }

    #[tokio::test]
    async fn require_patient_rejects_doctors_and_strangers() {
        let store = InMemoryUserStore::new();
        let doctor = store
            .create(NewUser {
                email: "d@example.com".to_string(),
                full_name: "Dr Smith".to_string(),
                role: Role::Doctor,
            })
            .await
            .unwrap();

        let err = require_patient(&store, doctor.id).await.unwrap_err();
        assert!(matches!(err, PortalError::UnknownPatient(_)));

        let err = require_patient(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortalError::UnknownPatient(_)));
    }
}

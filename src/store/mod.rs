//! Storage contracts for users, documents and notifications.
//!
//! Every mutation that the collaboration model depends on is expressed as a
//! single conditional write (`add_collaborator`, `remove_collaborator`,
//! `create_if_absent`), so concurrent requests cannot both pass a check and
//! then both write.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ScribaError;
use crate::models::{NewDocument, NewNotification, NewUser};
use crate::types::{
    Document, DocumentPatch, Notification, NotificationFilter, User,
};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ScribaError>;

    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, ScribaError>;

    /// Fails with `DuplicateUser` when the username or email is taken.
    async fn create(&self, user: NewUser) -> Result<User, ScribaError>;

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<User>, ScribaError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Document>, ScribaError>;

    async fn find_by_name(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<Document>, ScribaError>;

    /// Documents owned by `user`, followed by those shared with `user`.
    async fn find_accessible(
        &self,
        user: Uuid,
    ) -> Result<Vec<Document>, ScribaError>;

    /// Fails with `DuplicateName` when the owner already has that name.
    async fn create(&self, doc: NewDocument) -> Result<Document, ScribaError>;

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<Option<Document>, ScribaError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError>;

    /// Add-to-set. Returns `false` when `user` was already present.
    async fn add_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError>;

    /// Returns `false` when `user` was not present.
    async fn remove_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Notification>, ScribaError>;

    async fn find(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, ScribaError>;

    async fn find_one(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Option<Notification>, ScribaError>;

    /// Insert unless a row with the same dedup key exists, in which case
    /// `None` is returned.
    async fn create_if_absent(
        &self,
        notification: NewNotification,
    ) -> Result<Option<Notification>, ScribaError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError>;
}

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn postgres(pool: crate::db::DbConnectionPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            documents: store.clone(),
            notifications: store,
        }
    }

    pub fn memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            users: store.clone(),
            documents: store.clone(),
            notifications: store,
        }
    }
}

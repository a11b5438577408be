use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ScribaError;
use crate::models;
use crate::protocol::ErrorCode;
use crate::store::{DocumentStore, NotificationStore, UserStore};
use crate::types::{
    Document, DocumentPatch, Notification, NotificationFilter, User,
};

// In-process store. Every operation holds the single state lock for its
// whole duration, so check-and-write sequences are atomic.

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    documents: HashMap<Uuid, Document>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut docs: Vec<Document>) -> Vec<Document> {
    docs.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    docs
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: models::NewUser) -> Result<User, ScribaError> {
        let mut state = self.state.lock().await;
        let taken = state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken || state.users.contains_key(&user.id) {
            return Err(ScribaError::new(
                ErrorCode::DuplicateUser,
                "Username or email is already taken",
            ));
        }
        let created = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            password_changed_at: None,
            created_at: user.created_at,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: chrono::DateTime<Utc>,
    ) -> Result<Option<User>, ScribaError> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&id).map(|user| {
            user.password_hash = password_hash;
            user.password_changed_at = Some(changed_at);
            user.clone()
        }))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Document>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state.documents.get(&id).cloned())
    }

    async fn find_by_name(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<Document>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .values()
            .find(|d| d.owner == owner && d.name == name)
            .cloned())
    }

    async fn find_accessible(
        &self,
        user: Uuid,
    ) -> Result<Vec<Document>, ScribaError> {
        let state = self.state.lock().await;
        let owned = state
            .documents
            .values()
            .filter(|d| d.owner == user)
            .cloned()
            .collect();
        let shared = state
            .documents
            .values()
            .filter(|d| d.is_collaborator(user))
            .cloned()
            .collect();
        let mut docs = sorted(owned);
        docs.extend(sorted(shared));
        Ok(docs)
    }

    async fn create(
        &self,
        doc: models::NewDocument,
    ) -> Result<Document, ScribaError> {
        let mut state = self.state.lock().await;
        let duplicate = state
            .documents
            .values()
            .any(|d| d.owner == doc.owner && d.name == doc.name);
        if duplicate {
            return Err(ScribaError::new(
                ErrorCode::DuplicateName,
                "A document with this name already exists",
            ));
        }
        let created = Document {
            id: doc.id,
            name: doc.name,
            owner: doc.owner,
            collaborators: Vec::new(),
            content: doc.content,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        };
        state.documents.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<Option<Document>, ScribaError> {
        let mut state = self.state.lock().await;
        if let Some(name) = &patch.name {
            let Some(doc) = state.documents.get(&id) else {
                return Ok(None);
            };
            let owner = doc.owner;
            let duplicate = state
                .documents
                .values()
                .any(|d| d.id != id && d.owner == owner && d.name == *name);
            if duplicate {
                return Err(ScribaError::new(
                    ErrorCode::DuplicateName,
                    "A document with this name already exists",
                ));
            }
        }
        Ok(state.documents.get_mut(&id).map(|doc| {
            if let Some(name) = patch.name {
                doc.name = name;
            }
            if let Some(content) = patch.content {
                doc.content = content;
            }
            doc.updated_at = Utc::now();
            doc.clone()
        }))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError> {
        let mut state = self.state.lock().await;
        Ok(state.documents.remove(&id).is_some())
    }

    async fn add_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError> {
        let mut state = self.state.lock().await;
        let Some(doc) = state.documents.get_mut(&id) else {
            return Err(ScribaError::not_found("Document or user not found"));
        };
        if doc.is_collaborator(user) {
            return Ok(false);
        }
        doc.collaborators.push(user);
        Ok(true)
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError> {
        let mut state = self.state.lock().await;
        let Some(doc) = state.documents.get_mut(&id) else {
            return Ok(false);
        };
        match doc.collaborators.iter().position(|c| *c == user) {
            Some(index) => {
                doc.collaborators.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Notification>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn find(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    async fn find_one(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Option<Notification>, ScribaError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .find(|n| filter.matches(n))
            .cloned())
    }

    async fn create_if_absent(
        &self,
        notification: models::NewNotification,
    ) -> Result<Option<Notification>, ScribaError> {
        let mut state = self.state.lock().await;
        let exists = state.notifications.iter().any(|n| {
            n.kind == notification.kind
                && n.receiver == notification.receiver
                && n.sender == notification.sender
                && n.doc_id == notification.doc_id
                && n.message == notification.message
        });
        if exists {
            return Ok(None);
        }
        let created = Notification {
            id: notification.id,
            kind: notification.kind,
            receiver: notification.receiver,
            sender: notification.sender,
            doc_id: notification.doc_id,
            message: notification.message,
            created_at: notification.created_at,
        };
        state.notifications.push(created.clone());
        Ok(Some(created))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError> {
        let mut state = self.state.lock().await;
        let before = state.notifications.len();
        state.notifications.retain(|n| n.id != id);
        Ok(state.notifications.len() != before)
    }
}

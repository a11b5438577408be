use chrono::Utc;
use uuid::Uuid;

use crate::models;
use crate::store::Stores;
use crate::types::{placeholder_content, Document, User};

pub struct Fixture {
    pub stores: Stores,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            stores: Stores::memory(),
        }
    }

    pub async fn user(&self, username: &str) -> User {
        self.stores
            .users
            .create(models::NewUser {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: format!("{}@example.com", username.to_lowercase()),
                password_hash: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    pub async fn document(&self, owner: &User, name: &str) -> Document {
        let now = Utc::now();
        self.stores
            .documents
            .create(models::NewDocument {
                id: Uuid::new_v4(),
                name: name.to_string(),
                owner: owner.id,
                content: placeholder_content(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, doc: &Document) -> Option<Document> {
        self.stores.documents.find_by_id(doc.id).await.unwrap()
    }
}

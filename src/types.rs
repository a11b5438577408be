use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models;

pub type User = models::User;

pub type Notification = models::Notification;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub collaborators: Vec<Uuid>,
    pub content: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    pub fn from_model(doc: models::Document, collaborators: Vec<Uuid>) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            owner: doc.owner,
            collaborators,
            content: doc.content,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }

    pub fn is_collaborator(&self, user: Uuid) -> bool {
        self.collaborators.contains(&user)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Collaborator {
    pub id: Uuid,
    pub username: String,
}

/// Document with collaborator ids resolved to usernames.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedDocument {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub collaborators: Vec<Collaborator>,
    pub content: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, Debug)]
pub struct Listing<T> {
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

#[derive(Deserialize, Default, Clone, Debug)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub content: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    AccessRequest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AccessRequest => "access request",
        }
    }
}

/// Exact-match filter over notification fields, unset fields match anything.
#[derive(Default, Clone, Debug)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub receiver: Option<Uuid>,
    pub sender: Option<Uuid>,
    pub doc: Option<Uuid>,
    pub message: Option<String>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        self.kind.map_or(true, |k| k.as_str() == n.kind)
            && self.receiver.map_or(true, |r| r == n.receiver)
            && self.sender.map_or(true, |s| s == n.sender)
            && self.doc.map_or(true, |d| d == n.doc_id)
            && self.message.as_ref().map_or(true, |m| *m == n.message)
    }
}

pub fn placeholder_content() -> serde_json::Value {
    serde_json::json!([
        {
            "type": "paragraph",
            "children": [
                { "text": "Example: \n" },
                { "text": "Lorem ipsum dolor sit amet, consectetur adipiscing elit." }
            ]
        }
    ])
}

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema;

#[derive(serde::Serialize, Selectable, Queryable, Clone, Debug)]
#[serde(rename_all = "camelCase")]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Clone)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Selectable, Queryable, Clone, Debug)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Clone)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(AsChangeset)]
#[diesel(table_name = schema::documents)]
pub struct DocumentChanges<'a> {
    pub name: Option<&'a str>,
    pub content: Option<&'a serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::collaborators)]
pub struct NewCollaborator {
    pub id: Uuid,
    pub doc_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(
    serde::Serialize,
    serde::Deserialize,
    Selectable,
    Queryable,
    Clone,
    Debug,
    PartialEq,
)]
#[serde(rename_all = "camelCase")]
#[diesel(table_name = schema::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub receiver: Uuid,
    pub sender: Uuid,
    #[serde(rename = "doc")]
    pub doc_id: Uuid,
    #[serde(rename = "notification")]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Clone)]
#[diesel(table_name = schema::notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub kind: String,
    pub receiver: Uuid,
    pub sender: Uuid,
    pub doc_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

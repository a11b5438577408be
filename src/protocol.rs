use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Notification;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    Unauthenticated,
    NotFound,
    Forbidden,
    DuplicateName,
    DuplicateUser,
    DuplicatePending,
    AlreadyOwner,
    AlreadyCollaborator,
    SelfRequest,
    NotACollaborator,
    IdentityMismatch,
    InternalServerError,
}

/// Coarse failure class of an [`ErrorCode`], used for status mapping.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Unauthenticated,
    NotFound,
    Forbidden,
    Conflict,
    InvalidState,
    IdentityMismatch,
    Internal,
}

impl ErrorCode {
    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorCode::BadRequest => ErrorKind::BadRequest,
            ErrorCode::Unauthenticated => ErrorKind::Unauthenticated,
            ErrorCode::NotFound => ErrorKind::NotFound,
            ErrorCode::Forbidden => ErrorKind::Forbidden,
            ErrorCode::DuplicateName
            | ErrorCode::DuplicateUser
            | ErrorCode::DuplicatePending
            | ErrorCode::AlreadyOwner
            | ErrorCode::AlreadyCollaborator
            | ErrorCode::SelfRequest => ErrorKind::Conflict,
            ErrorCode::NotACollaborator => ErrorKind::InvalidState,
            ErrorCode::IdentityMismatch => ErrorKind::IdentityMismatch,
            ErrorCode::InternalServerError => ErrorKind::Internal,
        }
    }
}

// Websocket messages

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatMessage {
    pub i: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OperationsMessage {
    pub doc: Uuid,
    pub ops: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationCreatedMessage {
    pub notification: Notification,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationDeletedMessage {
    pub id: Uuid,
    pub receiver: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationChange {
    Added,
    Removed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CollaborationChangedMessage {
    pub doc: Uuid,
    pub user: Uuid,
    pub change: CollaborationChange,
    pub collaborators: Vec<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RemoteOperationsMessage {
    pub doc: Uuid,
    pub user: Uuid,
    pub ops: serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "kind")]
pub enum ClientMessage {
    #[serde(rename = "h")]
    Heartbeat(HeartbeatMessage),

    #[serde(rename = "operations")]
    Operations(OperationsMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind")]
pub enum ServerMessage {
    #[serde(rename = "h")]
    Heartbeat(HeartbeatMessage),

    #[serde(rename = "notification_created")]
    NotificationCreated(NotificationCreatedMessage),

    #[serde(rename = "notification_deleted")]
    NotificationDeleted(NotificationDeletedMessage),

    #[serde(rename = "collaboration_changed")]
    CollaborationChanged(CollaborationChangedMessage),

    #[serde(rename = "remote_operations")]
    RemoteOperations(RemoteOperationsMessage),

    #[serde(rename = "error")]
    Error(ErrorMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_invalid_state_codes() {
        assert_eq!(ErrorCode::DuplicatePending.kind(), ErrorKind::Conflict);
        assert_eq!(ErrorCode::SelfRequest.kind(), ErrorKind::Conflict);
        assert_eq!(
            ErrorCode::NotACollaborator.kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn client_messages_are_tagged_by_kind() {
        let doc = Uuid::new_v4();
        let raw = format!(
            r#"{{"kind":"operations","doc":"{}","ops":[{{"insert":"a"}}]}}"#,
            doc
        );
        let Ok(ClientMessage::Operations(msg)) =
            serde_json::from_str::<ClientMessage>(&raw)
        else {
            panic!("expected operations message");
        };
        assert_eq!(msg.doc, doc);

        let hb = serde_json::from_str::<ClientMessage>(r#"{"kind":"h","i":3}"#);
        assert!(matches!(hb, Ok(ClientMessage::Heartbeat(HeartbeatMessage { i: 3 }))));
    }

    #[test]
    fn server_change_message_shape() {
        let msg = ServerMessage::CollaborationChanged(
            CollaborationChangedMessage {
                doc: Uuid::nil(),
                user: Uuid::nil(),
                change: CollaborationChange::Removed,
                collaborators: vec![],
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "collaboration_changed");
        assert_eq!(value["change"], "removed");
    }
}

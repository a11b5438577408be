//! Access requests and the notification inbox.
//!
//! A pending access request is an `access request` notification addressed to
//! the document owner. At most one may exist per
//! `(kind, receiver, sender, doc, message)`.

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ScribaError;
use crate::models;
use crate::protocol::ErrorCode;
use crate::store::Stores;
use crate::types::{
    Document, Listing, Notification, NotificationFilter, NotificationKind,
    User,
};

pub fn access_request_message(username: &str, doc_name: &str) -> String {
    format!("User {} requests access to document: {}", username, doc_name)
}

#[derive(Deserialize)]
pub struct RequestAccess {
    pub doc: Uuid,
    pub sender: Option<Uuid>,
}

/// Checked access request, ready to be stored.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub doc: Document,
    pub owner: User,
    pub sender: User,
    pub message: String,
}

impl AccessRequest {
    fn filter(&self) -> NotificationFilter {
        NotificationFilter {
            kind: Some(NotificationKind::AccessRequest),
            receiver: Some(self.owner.id),
            sender: Some(self.sender.id),
            doc: Some(self.doc.id),
            message: Some(self.message.clone()),
        }
    }
}

fn duplicate_pending() -> ScribaError {
    ScribaError::new(
        ErrorCode::DuplicatePending,
        "An access request for this document is already pending",
    )
}

pub struct NotificationsApi {
    stores: Stores,
}

impl NotificationsApi {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn check_duplicate_and_authorize(
        &self,
        doc_id: Uuid,
        declared_sender: Option<Uuid>,
        caller: &User,
    ) -> Result<AccessRequest, ScribaError> {
        let Some(doc) = self.stores.documents.find_by_id(doc_id).await? else {
            return Err(ScribaError::not_found("Document not found"));
        };
        if doc.owner == caller.id {
            return Err(ScribaError::new(
                ErrorCode::SelfRequest,
                "You already own this document",
            ));
        }
        if declared_sender.is_some_and(|sender| sender != caller.id) {
            debug!(
                "notifications: {} tried to request access as {:?}",
                caller.id, declared_sender
            );
            return Err(ScribaError::identity_mismatch(
                "Sender does not match the logged in user",
            ));
        }
        let Some(owner) = self.stores.users.find_by_id(doc.owner).await? else {
            return Err(ScribaError::not_found("Document owner not found"));
        };
        let message = access_request_message(&caller.username, &doc.name);
        let draft = AccessRequest {
            doc,
            owner,
            sender: caller.clone(),
            message,
        };
        let existing =
            self.stores.notifications.find_one(&draft.filter()).await?;
        if existing.is_some() {
            return Err(duplicate_pending());
        }
        Ok(draft)
    }

    pub async fn create_access_notification(
        &self,
        draft: AccessRequest,
    ) -> Result<Notification, ScribaError> {
        let created = self
            .stores
            .notifications
            .create_if_absent(models::NewNotification {
                id: Uuid::new_v4(),
                kind: NotificationKind::AccessRequest.as_str().to_string(),
                receiver: draft.owner.id,
                sender: draft.sender.id,
                doc_id: draft.doc.id,
                message: draft.message,
                created_at: Utc::now(),
            })
            .await?;
        // a concurrent request may have been stored since the check
        let Some(notification) = created else {
            return Err(duplicate_pending());
        };
        info!(
            "notifications: {} requested access to {}",
            notification.sender, notification.doc_id
        );
        Ok(notification)
    }

    pub async fn request_access(
        &self,
        doc_id: Uuid,
        declared_sender: Option<Uuid>,
        caller: &User,
    ) -> Result<Notification, ScribaError> {
        let draft = self
            .check_duplicate_and_authorize(doc_id, declared_sender, caller)
            .await?;
        self.create_access_notification(draft).await
    }

    pub async fn list_inbox(
        &self,
        receiver: Uuid,
    ) -> Result<Listing<Notification>, ScribaError> {
        let filter = NotificationFilter {
            receiver: Some(receiver),
            ..Default::default()
        };
        let items = self.stores.notifications.find(&filter).await?;
        Ok(Listing::new(items))
    }

    /// Any authenticated caller may delete any notification by id. Deleting
    /// an absent id succeeds and returns `None`.
    pub async fn delete_notification(
        &self,
        id: Uuid,
    ) -> Result<Option<Notification>, ScribaError> {
        let Some(notification) =
            self.stores.notifications.find_by_id(id).await?
        else {
            debug!("notifications: delete of absent {}", id);
            return Ok(None);
        };
        // a concurrent delete may have won since the read above
        if !self.stores.notifications.delete_by_id(id).await? {
            return Ok(None);
        }
        info!("notifications: deleted {}", id);
        Ok(Some(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn message_text() {
        assert_eq!(
            access_request_message("U2", "Report"),
            "User U2 requests access to document: Report"
        );
    }

    #[tokio::test]
    async fn owner_cannot_request_own_document() {
        let fx = Fixture::new();
        let api = NotificationsApi::new(fx.stores.clone());
        let u1 = fx.user("U1").await;
        let doc = fx.document(&u1, "Report").await;

        let err = api
            .request_access(doc.id, Some(u1.id), &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SelfRequest);
        assert_eq!(api.list_inbox(u1.id).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn repeated_request_is_rejected() {
        let fx = Fixture::new();
        let api = NotificationsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;

        let created = api.request_access(doc.id, None, &u2).await.unwrap();
        assert_eq!(created.receiver, u1.id);
        assert_eq!(created.sender, u2.id);
        assert_eq!(created.kind, "access request");
        assert_eq!(
            created.message,
            "User U2 requests access to document: Report"
        );

        let err = api
            .request_access(doc.id, Some(u2.id), &u2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicatePending);
        assert_eq!(api.list_inbox(u1.id).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn stale_draft_loses_to_stored_request() {
        let fx = Fixture::new();
        let api = NotificationsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;

        let first = api
            .check_duplicate_and_authorize(doc.id, None, &u2)
            .await
            .unwrap();
        let second = first.clone();
        api.create_access_notification(first).await.unwrap();
        let err = api.create_access_notification(second).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicatePending);
    }

    #[tokio::test]
    async fn declared_sender_must_be_caller() {
        let fx = Fixture::new();
        let api = NotificationsApi::new(fx.stores.clone());
        let (u1, u2, u3) =
            (fx.user("U1").await, fx.user("U2").await, fx.user("U3").await);
        let doc = fx.document(&u1, "Report").await;

        let err = api
            .request_access(doc.id, Some(u3.id), &u2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IdentityMismatch);

        let err = api
            .request_access(Uuid::new_v4(), None, &u2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn inbox_count_follows_delete() {
        let fx = Fixture::new();
        let api = NotificationsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;

        let created = api.request_access(doc.id, None, &u2).await.unwrap();
        let inbox = api.list_inbox(u1.id).await.unwrap();
        assert_eq!(inbox.count, 1);
        assert_eq!(inbox.items, vec![created.clone()]);
        assert_eq!(api.list_inbox(u2.id).await.unwrap().count, 0);

        let deleted = api.delete_notification(created.id).await.unwrap();
        assert_eq!(deleted, Some(created.clone()));
        assert_eq!(api.list_inbox(u1.id).await.unwrap().count, 0);

        // repeated and unknown deletes are no-ops
        assert_eq!(api.delete_notification(created.id).await.unwrap(), None);
        assert_eq!(
            api.delete_notification(Uuid::new_v4()).await.unwrap(),
            None
        );
        assert_eq!(api.list_inbox(u1.id).await.unwrap().count, 0);

        // the request can be made again once the pending one is gone
        assert!(api.request_access(doc.id, None, &u2).await.is_ok());
    }
}

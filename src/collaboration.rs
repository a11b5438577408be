//! Collaborator set mutations.
//!
//! A (document, user) pair moves `NoRelation -> PendingRequest ->
//! Collaborator` through an access request and its acceptance, and back to
//! `NoRelation` when the owner removes the collaborator. The pending state
//! exists only as an access-request notification.

use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::access::require_owner;
use crate::error::ScribaError;
use crate::protocol::ErrorCode;
use crate::store::Stores;
use crate::types::{Document, User};

#[derive(Deserialize)]
pub struct RemoveCollaborator {
    pub collaborator: Uuid,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub sender: Uuid,
}

fn not_a_collaborator() -> ScribaError {
    ScribaError::new(ErrorCode::NotACollaborator, "This user is not a collaborator")
}

fn already_collaborator() -> ScribaError {
    ScribaError::new(
        ErrorCode::AlreadyCollaborator,
        "This user is already a collaborator",
    )
}

pub struct CollaborationApi {
    stores: Stores,
}

impl CollaborationApi {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    async fn fetch(&self, id: Uuid) -> Result<Document, ScribaError> {
        match self.stores.documents.find_by_id(id).await? {
            Some(doc) => Ok(doc),
            None => Err(ScribaError::not_found("Document not found")),
        }
    }

    pub async fn remove_collaborator(
        &self,
        doc_id: Uuid,
        collaborator: Uuid,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self.fetch(doc_id).await?;
        require_owner(&doc, caller.id)?;
        // an empty set is just a set without this member
        if !doc.is_collaborator(collaborator) {
            return Err(not_a_collaborator());
        }
        // a concurrent removal may have won since the read above
        let removed = self
            .stores
            .documents
            .remove_collaborator(doc_id, collaborator)
            .await?;
        if !removed {
            return Err(not_a_collaborator());
        }
        info!("collab: {} removed from {}", collaborator, doc_id);
        self.fetch(doc_id).await
    }

    /// Any authenticated caller may accept on behalf of `sender`.
    pub async fn accept_access_request(
        &self,
        doc_id: Uuid,
        sender: Uuid,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self.stores.documents.find_by_id(doc_id).await?;
        let user = self.stores.users.find_by_id(sender).await?;
        let (Some(doc), Some(user)) = (doc, user) else {
            return Err(ScribaError::not_found("Document or user not found"));
        };
        if user.id == doc.owner {
            return Err(ScribaError::new(
                ErrorCode::AlreadyOwner,
                "This user already owns the document",
            ));
        }
        if doc.is_collaborator(user.id) {
            return Err(already_collaborator());
        }
        let added = self
            .stores
            .documents
            .add_collaborator(doc_id, user.id)
            .await?;
        if !added {
            return Err(already_collaborator());
        }
        info!(
            "collab: {} added to {} (accepted by {})",
            user.id, doc_id, caller.id
        );
        self.fetch(doc_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn accept_then_repeat() {
        let fx = Fixture::new();
        let api = CollaborationApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;

        let updated = api.accept_access_request(doc.id, u2.id, &u2).await.unwrap();
        assert_eq!(updated.collaborators, vec![u2.id]);

        let err = api
            .accept_access_request(doc.id, u2.id, &u2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyCollaborator);
    }

    #[tokio::test]
    async fn accept_rejects_owner_and_missing_entities() {
        let fx = Fixture::new();
        let api = CollaborationApi::new(fx.stores.clone());
        let u1 = fx.user("U1").await;
        let doc = fx.document(&u1, "Report").await;

        let err = api
            .accept_access_request(doc.id, u1.id, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyOwner);

        let err = api
            .accept_access_request(doc.id, Uuid::new_v4(), &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = api
            .accept_access_request(Uuid::new_v4(), u1.id, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn remove_then_repeat() {
        let fx = Fixture::new();
        let api = CollaborationApi::new(fx.stores.clone());
        let (u1, u2, u3) =
            (fx.user("U1").await, fx.user("U2").await, fx.user("U3").await);
        let doc = fx.document(&u1, "Report").await;
        api.accept_access_request(doc.id, u2.id, &u2).await.unwrap();
        api.accept_access_request(doc.id, u3.id, &u3).await.unwrap();

        let updated = api.remove_collaborator(doc.id, u2.id, &u1).await.unwrap();
        assert_eq!(updated.collaborators, vec![u3.id]);

        let err = api
            .remove_collaborator(doc.id, u2.id, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotACollaborator);
    }

    #[tokio::test]
    async fn remove_from_report_scenario() {
        let fx = Fixture::new();
        let api = CollaborationApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;
        api.accept_access_request(doc.id, u2.id, &u2).await.unwrap();

        let updated = api.remove_collaborator(doc.id, u2.id, &u1).await.unwrap();
        assert!(updated.collaborators.is_empty());

        let err = api
            .remove_collaborator(doc.id, u2.id, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotACollaborator);
        assert_eq!(err.kind, crate::protocol::ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn remove_requires_owner() {
        let fx = Fixture::new();
        let api = CollaborationApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;
        api.accept_access_request(doc.id, u2.id, &u2).await.unwrap();

        let err = api
            .remove_collaborator(doc.id, u2.id, &u2)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        let err = api
            .remove_collaborator(Uuid::new_v4(), u2.id, &u1)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}

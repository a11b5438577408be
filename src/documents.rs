use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{require_owner, require_owner_or_collaborator};
use crate::error::ScribaError;
use crate::models;
use crate::protocol::ErrorCode;
use crate::store::Stores;
use crate::types::{
    placeholder_content, Collaborator, Document, DocumentPatch, Listing,
    PopulatedDocument, User,
};

#[derive(Deserialize)]
pub struct CreateDocument {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize)]
pub struct Owner {
    pub owner: Uuid,
}

fn duplicate_name() -> ScribaError {
    ScribaError::new(
        ErrorCode::DuplicateName,
        "A document with this name already exists",
    )
}

fn normalize_name(name: &str) -> Result<String, ScribaError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ScribaError::bad_request("Document name is required"));
    }
    Ok(name.to_string())
}

pub struct DocumentsApi {
    stores: Stores,
}

impl DocumentsApi {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Document, ScribaError> {
        match self.stores.documents.find_by_id(id).await? {
            Some(doc) => Ok(doc),
            None => Err(ScribaError::not_found("Document not found")),
        }
    }

    pub async fn list_documents(
        &self,
        caller: &User,
    ) -> Result<Listing<Document>, ScribaError> {
        let docs = self.stores.documents.find_accessible(caller.id).await?;
        Ok(Listing::new(docs))
    }

    pub async fn create_document(
        &self,
        caller: &User,
        props: CreateDocument,
    ) -> Result<Document, ScribaError> {
        let name = normalize_name(&props.name)?;
        let existing =
            self.stores.documents.find_by_name(caller.id, &name).await?;
        if existing.is_some() {
            return Err(duplicate_name());
        }
        let now = Utc::now();
        let doc = self
            .stores
            .documents
            .create(models::NewDocument {
                id: Uuid::new_v4(),
                name,
                owner: caller.id,
                content: placeholder_content(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!("docs: {} created {}", caller.id, doc.id);
        Ok(doc)
    }

    pub async fn get_document(
        &self,
        id: Uuid,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self.fetch(id).await?;
        require_owner_or_collaborator(&doc, caller.id)?;
        Ok(doc)
    }

    pub async fn get_document_populated(
        &self,
        id: Uuid,
        caller: &User,
    ) -> Result<PopulatedDocument, ScribaError> {
        let doc = self.fetch(id).await?;
        require_owner(&doc, caller.id)?;
        let mut collaborators = Vec::with_capacity(doc.collaborators.len());
        for user_id in &doc.collaborators {
            // users deleted after joining are skipped
            if let Some(user) = self.stores.users.find_by_id(*user_id).await? {
                collaborators.push(Collaborator {
                    id: user.id,
                    username: user.username,
                });
            }
        }
        Ok(PopulatedDocument {
            id: doc.id,
            name: doc.name,
            owner: doc.owner,
            collaborators,
            content: doc.content,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }

    pub async fn get_owner(&self, id: Uuid) -> Result<Owner, ScribaError> {
        let doc = self.fetch(id).await?;
        Ok(Owner { owner: doc.owner })
    }

    pub async fn update_document(
        &self,
        id: Uuid,
        caller: &User,
        patch: DocumentPatch,
    ) -> Result<Document, ScribaError> {
        let doc = self.fetch(id).await?;
        require_owner_or_collaborator(&doc, caller.id)?;

        let name = match &patch.name {
            Some(name) => {
                let name = normalize_name(name)?;
                let existing =
                    self.stores.documents.find_by_name(doc.owner, &name).await?;
                if existing.is_some_and(|other| other.id != doc.id) {
                    return Err(duplicate_name());
                }
                Some(name)
            }
            None => None,
        };
        let patch = DocumentPatch {
            name,
            content: patch.content,
        };
        match self.stores.documents.update_by_id(id, patch).await? {
            Some(doc) => Ok(doc),
            None => Err(ScribaError::not_found("Document not found")),
        }
    }

    pub async fn delete_document(
        &self,
        id: Uuid,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self.fetch(id).await?;
        require_owner(&doc, caller.id)?;
        if !self.stores.documents.delete_by_id(id).await? {
            return Err(ScribaError::not_found("Document not found"));
        }
        info!("docs: {} deleted {}", caller.id, id);
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn create(name: &str) -> CreateDocument {
        CreateDocument {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn create_checks_name_per_owner() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);

        let doc = api.create_document(&u1, create("Report")).await.unwrap();
        assert_eq!(doc.owner, u1.id);
        assert!(doc.collaborators.is_empty());
        assert_eq!(doc.content, placeholder_content());

        let err = api.create_document(&u1, create("Report")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateName);
        assert!(api.create_document(&u2, create("Report")).await.is_ok());

        let err = api.create_document(&u1, create("  ")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn get_requires_owner_or_collaborator() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let (u1, u2, u3) =
            (fx.user("U1").await, fx.user("U2").await, fx.user("U3").await);
        let doc = fx.document(&u1, "Report").await;
        fx.stores.documents.add_collaborator(doc.id, u2.id).await.unwrap();

        assert!(api.get_document(doc.id, &u1).await.is_ok());
        assert!(api.get_document(doc.id, &u2).await.is_ok());
        let err = api.get_document(doc.id, &u3).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        let err = api.get_document(Uuid::new_v4(), &u1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn populated_view_is_owner_only() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;
        fx.stores.documents.add_collaborator(doc.id, u2.id).await.unwrap();

        let populated = api.get_document_populated(doc.id, &u1).await.unwrap();
        assert_eq!(
            populated.collaborators,
            vec![Collaborator {
                id: u2.id,
                username: "U2".to_string()
            }]
        );
        let err = api.get_document_populated(doc.id, &u2).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn collaborator_can_update_but_not_delete() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let doc = fx.document(&u1, "Report").await;
        fx.stores.documents.add_collaborator(doc.id, u2.id).await.unwrap();

        let patch = DocumentPatch {
            name: Some("Quarterly".to_string()),
            content: Some(serde_json::json!([{"type": "paragraph"}])),
        };
        let updated = api.update_document(doc.id, &u2, patch).await.unwrap();
        assert_eq!(updated.name, "Quarterly");
        assert_eq!(updated.owner, u1.id);
        assert_eq!(updated.collaborators, vec![u2.id]);

        let err = api.delete_document(doc.id, &u2).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        api.delete_document(doc.id, &u1).await.unwrap();
        assert!(fx.reload(&doc).await.is_none());
    }

    #[tokio::test]
    async fn rename_respects_owner_scope() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let u1 = fx.user("U1").await;
        let report = fx.document(&u1, "Report").await;
        fx.document(&u1, "Notes").await;

        let same = DocumentPatch {
            name: Some("Report".to_string()),
            content: None,
        };
        assert!(api.update_document(report.id, &u1, same).await.is_ok());

        let taken = DocumentPatch {
            name: Some("Notes".to_string()),
            content: None,
        };
        let err = api.update_document(report.id, &u1, taken).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateName);
    }

    #[tokio::test]
    async fn list_returns_owned_then_shared() {
        let fx = Fixture::new();
        let api = DocumentsApi::new(fx.stores.clone());
        let (u1, u2) = (fx.user("U1").await, fx.user("U2").await);
        let own = fx.document(&u2, "Mine").await;
        let shared = fx.document(&u1, "Report").await;
        fx.document(&u1, "Private").await;
        fx.stores
            .documents
            .add_collaborator(shared.id, u2.id)
            .await
            .unwrap();

        let listing = api.list_documents(&u2).await.unwrap();
        assert_eq!(listing.count, 2);
        let ids: Vec<Uuid> = listing.items.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![own.id, shared.id]);

        let owner = api.get_owner(shared.id).await.unwrap();
        assert_eq!(owner.owner, u1.id);
    }
}

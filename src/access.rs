//! Per-request authorization over a fetched document.
//!
//! Decisions are computed from the document as loaded for the current
//! request and are never cached, because collaborator membership can change
//! between requests.

use uuid::Uuid;

use crate::error::ScribaError;
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Collaborator,
    Unauthorized,
}

impl Access {
    pub fn of(doc: &Document, caller: Uuid) -> Self {
        if doc.owner == caller {
            Access::Owner
        } else if doc.is_collaborator(caller) {
            Access::Collaborator
        } else {
            Access::Unauthorized
        }
    }
}

pub fn require_owner(doc: &Document, caller: Uuid) -> Result<(), ScribaError> {
    match Access::of(doc, caller) {
        Access::Owner => Ok(()),
        _ => Err(ScribaError::forbidden(
            "You are not authorized to perform this action",
        )),
    }
}

pub fn require_owner_or_collaborator(
    doc: &Document,
    caller: Uuid,
) -> Result<Access, ScribaError> {
    match Access::of(doc, caller) {
        Access::Unauthorized => Err(ScribaError::forbidden(
            "You are not allowed to open or edit this document",
        )),
        access => Ok(access),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;

    fn doc(owner: Uuid, collaborators: Vec<Uuid>) -> Document {
        Document {
            id: Uuid::new_v4(),
            name: "Report".to_string(),
            owner,
            collaborators,
            content: serde_json::Value::Null,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn classification() {
        let (owner, collab, stranger) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let doc = doc(owner, vec![collab]);
        assert_eq!(Access::of(&doc, owner), Access::Owner);
        assert_eq!(Access::of(&doc, collab), Access::Collaborator);
        assert_eq!(Access::of(&doc, stranger), Access::Unauthorized);
    }

    #[test]
    fn owner_gate() {
        let (owner, collab, stranger) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let doc = doc(owner, vec![collab]);
        assert!(require_owner(&doc, owner).is_ok());
        for caller in [collab, stranger] {
            let err = require_owner(&doc, caller).unwrap_err();
            assert_eq!(err.code, ErrorCode::Forbidden);
        }
    }

    #[test]
    fn owner_or_collaborator_gate() {
        let (owner, collab, stranger) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let doc = doc(owner, vec![collab]);
        assert_eq!(require_owner_or_collaborator(&doc, owner).unwrap(), Access::Owner);
        assert_eq!(
            require_owner_or_collaborator(&doc, collab).unwrap(),
            Access::Collaborator
        );
        let err = require_owner_or_collaborator(&doc, stranger).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn ids_compare_by_value() {
        let owner = Uuid::new_v4();
        let collab = Uuid::new_v4();
        let doc = doc(owner, vec![collab]);
        let same_owner = Uuid::parse_str(&owner.to_string()).unwrap();
        let same_collab = Uuid::from_bytes(*collab.as_bytes());
        assert!(require_owner(&doc, same_owner).is_ok());
        assert!(require_owner_or_collaborator(&doc, same_collab).is_ok());
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::db;
use crate::error::{internal_error, ScribaError};
use crate::models;
use crate::protocol::ErrorCode;
use crate::schema;
use crate::store::{DocumentStore, NotificationStore, UserStore};
use crate::types::{
    Document, DocumentPatch, Notification, NotificationFilter, User,
};

pub struct PgStore {
    pool: db::DbConnectionPool,
}

/// Maps a unique constraint violation to `conflict`, anything else is internal
fn unique_violation(err: DieselError, conflict: ScribaError) -> ScribaError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            conflict
        }
        err => internal_error(err),
    }
}

fn duplicate_name() -> ScribaError {
    ScribaError::new(
        ErrorCode::DuplicateName,
        "A document with this name already exists",
    )
}

fn filtered_notifications(
    filter: &NotificationFilter,
) -> schema::notifications::BoxedQuery<'_, Pg> {
    use schema::notifications;

    let mut query = notifications::table.into_boxed();
    if let Some(kind) = filter.kind {
        query = query.filter(notifications::kind.eq(kind.as_str()));
    }
    if let Some(receiver) = filter.receiver {
        query = query.filter(notifications::receiver.eq(receiver));
    }
    if let Some(sender) = filter.sender {
        query = query.filter(notifications::sender.eq(sender));
    }
    if let Some(doc) = filter.doc {
        query = query.filter(notifications::doc_id.eq(doc));
    }
    if let Some(message) = &filter.message {
        query = query.filter(notifications::message.eq(message));
    }
    query.order((notifications::created_at.asc(), notifications::id.asc()))
}

impl PgStore {
    pub fn new(pool: db::DbConnectionPool) -> Self {
        Self { pool }
    }

    async fn connect(&self) -> Result<db::DbConnection, ScribaError> {
        self.pool.get().await.map_err(internal_error)
    }

    async fn collaborators_of(
        conn: &mut db::DbConnection,
        ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<Uuid>>, ScribaError> {
        use schema::collaborators;

        let rows: Vec<(Uuid, Uuid)> = collaborators::table
            .filter(collaborators::doc_id.eq_any(ids))
            .order((collaborators::created_at.asc(), collaborators::id.asc()))
            .select((collaborators::doc_id, collaborators::user_id))
            .load(conn)
            .await
            .map_err(internal_error)?;
        let mut res: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (doc, user) in rows {
            res.entry(doc).or_default().push(user);
        }
        Ok(res)
    }

    async fn with_collaborators(
        conn: &mut db::DbConnection,
        docs: Vec<models::Document>,
    ) -> Result<Vec<Document>, ScribaError> {
        let ids = docs.iter().map(|doc| doc.id).collect();
        let mut collaborators = Self::collaborators_of(conn, ids).await?;
        Ok(docs
            .into_iter()
            .map(|doc| {
                let list = collaborators.remove(&doc.id).unwrap_or_default();
                Document::from_model(doc, list)
            })
            .collect())
    }

    async fn load_one(
        conn: &mut db::DbConnection,
        doc: Option<models::Document>,
    ) -> Result<Option<Document>, ScribaError> {
        match doc {
            Some(doc) => {
                let mut docs = Self::with_collaborators(conn, vec![doc]).await?;
                Ok(docs.pop())
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ScribaError> {
        let mut conn = self.connect().await?;
        schema::users::table
            .find(id)
            .select(models::User::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }

    async fn find_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, ScribaError> {
        let mut conn = self.connect().await?;
        schema::users::table
            .filter(schema::users::email.eq(email))
            .select(models::User::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }

    async fn create(&self, user: models::NewUser) -> Result<User, ScribaError> {
        let mut conn = self.connect().await?;
        diesel::insert_into(schema::users::table)
            .values(&user)
            .returning(models::User::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|err| {
                unique_violation(
                    err,
                    ScribaError::new(
                        ErrorCode::DuplicateUser,
                        "Username or email is already taken",
                    ),
                )
            })
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        changed_at: chrono::DateTime<Utc>,
    ) -> Result<Option<User>, ScribaError> {
        use schema::users;

        let mut conn = self.connect().await?;
        diesel::update(users::table.find(id))
            .set((
                users::password_hash.eq(password_hash),
                users::password_changed_at.eq(Some(changed_at)),
            ))
            .returning(models::User::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Document>, ScribaError> {
        let mut conn = self.connect().await?;
        let doc = schema::documents::table
            .find(id)
            .select(models::Document::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(internal_error)?;
        Self::load_one(&mut conn, doc).await
    }

    async fn find_by_name(
        &self,
        owner: Uuid,
        name: &str,
    ) -> Result<Option<Document>, ScribaError> {
        use schema::documents;

        let mut conn = self.connect().await?;
        let doc = documents::table
            .filter(documents::owner.eq(owner))
            .filter(documents::name.eq(name))
            .select(models::Document::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(internal_error)?;
        Self::load_one(&mut conn, doc).await
    }

    async fn find_accessible(
        &self,
        user: Uuid,
    ) -> Result<Vec<Document>, ScribaError> {
        use schema::{collaborators, documents};

        let mut conn = self.connect().await?;
        let mut docs: Vec<models::Document> = documents::table
            .filter(documents::owner.eq(user))
            .order((documents::created_at.asc(), documents::id.asc()))
            .select(models::Document::as_select())
            .load(&mut conn)
            .await
            .map_err(internal_error)?;
        let shared_ids = collaborators::table
            .filter(collaborators::user_id.eq(user))
            .select(collaborators::doc_id);
        let shared: Vec<models::Document> = documents::table
            .filter(documents::id.eq_any(shared_ids))
            .order((documents::created_at.asc(), documents::id.asc()))
            .select(models::Document::as_select())
            .load(&mut conn)
            .await
            .map_err(internal_error)?;
        docs.extend(shared);
        Self::with_collaborators(&mut conn, docs).await
    }

    async fn create(
        &self,
        doc: models::NewDocument,
    ) -> Result<Document, ScribaError> {
        let mut conn = self.connect().await?;
        let created = diesel::insert_into(schema::documents::table)
            .values(&doc)
            .returning(models::Document::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|err| unique_violation(err, duplicate_name()))?;
        Ok(Document::from_model(created, Vec::new()))
    }

    async fn update_by_id(
        &self,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<Option<Document>, ScribaError> {
        let mut conn = self.connect().await?;
        let changes = models::DocumentChanges {
            name: patch.name.as_deref(),
            content: patch.content.as_ref(),
            updated_at: Utc::now(),
        };
        let updated = diesel::update(schema::documents::table.find(id))
            .set(&changes)
            .returning(models::Document::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(|err| unique_violation(err, duplicate_name()))?;
        Self::load_one(&mut conn, updated).await
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError> {
        let mut conn = self.connect().await?;
        let num = diesel::delete(schema::documents::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(internal_error)?;
        Ok(num != 0)
    }

    async fn add_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError> {
        use schema::collaborators;

        let mut conn = self.connect().await?;
        let row = models::NewCollaborator {
            id: Uuid::new_v4(),
            doc_id: id,
            user_id: user,
            created_at: Utc::now(),
        };
        let num = diesel::insert_into(collaborators::table)
            .values(&row)
            .on_conflict((collaborators::doc_id, collaborators::user_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(|err| match err {
                DieselError::DatabaseError(
                    DatabaseErrorKind::ForeignKeyViolation,
                    _,
                ) => ScribaError::not_found("Document or user not found"),
                err => internal_error(err),
            })?;
        Ok(num != 0)
    }

    async fn remove_collaborator(
        &self,
        id: Uuid,
        user: Uuid,
    ) -> Result<bool, ScribaError> {
        use schema::collaborators;

        let mut conn = self.connect().await?;
        let num = diesel::delete(collaborators::table)
            .filter(collaborators::doc_id.eq(id))
            .filter(collaborators::user_id.eq(user))
            .execute(&mut conn)
            .await
            .map_err(internal_error)?;
        Ok(num != 0)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<Notification>, ScribaError> {
        let mut conn = self.connect().await?;
        schema::notifications::table
            .find(id)
            .select(models::Notification::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }

    async fn find(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, ScribaError> {
        let mut conn = self.connect().await?;
        filtered_notifications(filter)
            .load::<models::Notification>(&mut conn)
            .await
            .map_err(internal_error)
    }

    async fn find_one(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Option<Notification>, ScribaError> {
        let mut conn = self.connect().await?;
        filtered_notifications(filter)
            .first::<models::Notification>(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }

    async fn create_if_absent(
        &self,
        notification: models::NewNotification,
    ) -> Result<Option<Notification>, ScribaError> {
        use schema::notifications;

        let mut conn = self.connect().await?;
        diesel::insert_into(notifications::table)
            .values(&notification)
            .on_conflict((
                notifications::kind,
                notifications::receiver,
                notifications::sender,
                notifications::doc_id,
                notifications::message,
            ))
            .do_nothing()
            .returning(models::Notification::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(internal_error)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, ScribaError> {
        let mut conn = self.connect().await?;
        let num = diesel::delete(schema::notifications::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(internal_error)?;
        Ok(num != 0)
    }
}

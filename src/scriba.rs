use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use log::{debug, error, info, trace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actors::hub::{HubHandle, HubMessage};
use crate::actors::FanOut;
use crate::collaboration::{AcceptRequest, CollaborationApi, RemoveCollaborator};
use crate::credentials::Credentials;
use crate::db;
use crate::documents::{CreateDocument, DocumentsApi};
use crate::error::{internal_error, ScribaError};
use crate::notifications::{NotificationsApi, RequestAccess};
use crate::protocol::*;
use crate::store::Stores;
use crate::types::{Document, DocumentPatch, Notification, User};
use crate::users::{Login, PasswordChange, Registration, UsersApi};

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u32 {
    8000
}
fn default_token_ttl_days() -> i64 {
    90
}
fn default_bcrypt_cost() -> u32 {
    12
}

#[derive(Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Postgres(db::DbConfig),
    Memory,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScribaConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u32,
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub secure_cookie: bool,
    pub store: StoreConfig,
}

/// `deleted` is null when no notification had the id.
#[derive(Serialize)]
struct DeletedNotification {
    deleted: Option<Notification>,
}

#[derive(Clone)]
pub struct Scriba {
    users: Arc<UsersApi>,
    documents: Arc<DocumentsApi>,
    collaboration: Arc<CollaborationApi>,
    notifications: Arc<NotificationsApi>,
    hub: HubHandle,
    fanout: Arc<dyn FanOut>,
    host: String,
    port: u32,
    token_ttl: chrono::Duration,
    secure_cookie: bool,
}

impl Scriba {
    pub async fn new(config: ScribaConfig) -> Result<Self, ScribaError> {
        let stores = match &config.store {
            StoreConfig::Postgres(db_config) => {
                let pool = db::create_pool(db_config).map_err(internal_error)?;
                let conn = pool.get().await.map_err(internal_error)?;
                db::run_migrations(deadpool::managed::Object::take(conn))
                    .await
                    .map_err(|err| {
                        error!("db: migrations failed: {}", err);
                        ScribaError::internal(&err.to_string())
                    })?;
                Stores::postgres(pool)
            }
            StoreConfig::Memory => {
                info!("scriba: using in-memory store, data is not persisted");
                Stores::memory()
            }
        };
        Ok(Self::with_stores(&config, stores))
    }

    pub fn with_stores(config: &ScribaConfig, stores: Stores) -> Self {
        let token_ttl = chrono::Duration::days(config.token_ttl_days);
        let credentials = Arc::new(Credentials::new(
            &config.jwt_secret,
            token_ttl,
            config.bcrypt_cost,
        ));
        let hub = HubHandle::new(stores.documents.clone());
        Self {
            users: Arc::new(UsersApi::new(stores.users.clone(), credentials)),
            documents: Arc::new(DocumentsApi::new(stores.clone())),
            collaboration: Arc::new(CollaborationApi::new(stores.clone())),
            notifications: Arc::new(NotificationsApi::new(stores)),
            fanout: Arc::new(hub.clone()),
            hub,
            host: config.host.clone(),
            port: config.port,
            token_ttl,
            secure_cookie: config.secure_cookie,
        }
    }

    #[cfg(test)]
    fn with_fanout(mut self, fanout: Arc<dyn FanOut>) -> Self {
        self.fanout = fanout;
        self
    }

    // Mutations that are mirrored to connected sessions

    async fn request_access(
        &self,
        props: RequestAccess,
        caller: &User,
    ) -> Result<Notification, ScribaError> {
        let notification = self
            .notifications
            .request_access(props.doc, props.sender, caller)
            .await?;
        self.fanout.broadcast(ServerMessage::NotificationCreated(
            NotificationCreatedMessage {
                notification: notification.clone(),
            },
        ));
        Ok(notification)
    }

    async fn delete_notification(
        &self,
        id: Uuid,
    ) -> Result<DeletedNotification, ScribaError> {
        let deleted = self.notifications.delete_notification(id).await?;
        if let Some(notification) = &deleted {
            self.fanout.broadcast(ServerMessage::NotificationDeleted(
                NotificationDeletedMessage {
                    id: notification.id,
                    receiver: notification.receiver,
                },
            ));
        }
        Ok(DeletedNotification { deleted })
    }

    async fn accept_access_request(
        &self,
        doc_id: Uuid,
        props: AcceptRequest,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self
            .collaboration
            .accept_access_request(doc_id, props.sender, caller)
            .await?;
        self.publish_collaboration(&doc, props.sender, CollaborationChange::Added);
        Ok(doc)
    }

    async fn remove_collaborator(
        &self,
        doc_id: Uuid,
        props: RemoveCollaborator,
        caller: &User,
    ) -> Result<Document, ScribaError> {
        let doc = self
            .collaboration
            .remove_collaborator(doc_id, props.collaborator, caller)
            .await?;
        self.publish_collaboration(
            &doc,
            props.collaborator,
            CollaborationChange::Removed,
        );
        Ok(doc)
    }

    fn publish_collaboration(
        &self,
        doc: &Document,
        user: Uuid,
        change: CollaborationChange,
    ) {
        self.fanout.broadcast(ServerMessage::CollaborationChanged(
            CollaborationChangedMessage {
                doc: doc.id,
                user,
                change,
                collaborators: doc.collaborators.clone(),
            },
        ));
    }

    fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "jwt={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            token,
            self.token_ttl.num_seconds()
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn app(&self) -> Router {
        let api_router = Router::new()
            // Users
            .route("/api/users/password", patch(change_password))
            .route("/api/users/:id", get(get_username))
            // Documents
            .route("/api/docs", get(list_documents).post(create_document))
            .route(
                "/api/docs/:id",
                get(get_document)
                    .patch(update_document)
                    .delete(delete_document),
            )
            .route("/api/docs/:id/populated", get(get_document_populated))
            .route("/api/docs/:id/owner", get(get_owner))
            // Collaboration
            .route(
                "/api/docs/:id/remove_collaborator",
                patch(remove_collaborator),
            )
            .route("/api/docs/:id/accept", post(accept_access_request))
            // Notifications
            .route("/api/notifications", get(list_inbox))
            .route(
                "/api/notifications/request_access",
                post(request_access),
            )
            .route(
                "/api/notifications/:id",
                axum::routing::delete(delete_notification),
            )
            .layer(middleware::from_fn_with_state(self.clone(), require_user))
            .with_state(self.clone());

        Router::new()
            .route("/", get(root))
            .route("/api/users/register", post(register))
            .route("/api/users/login", post(login))
            .route("/api/users/logout", get(logout))
            .route("/api/users/logged_in", get(logged_in))
            .route("/realtime", get(realtime_handler))
            .merge(api_router)
            .with_state(self.clone())
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        let app = self.app();
        let host = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&host).await?;
        info!("scriba: listening on {}", host);
        axum::serve(listener, app).await
    }

    async fn handle_connect(&self, mut websocket: WebSocket, token: Option<String>) {
        let res = match token {
            Some(token) => self.users.authenticate(&token).await,
            None => Err(ScribaError::unauthenticated("You are not logged in")),
        };
        let user = match res {
            Ok(user) => {
                trace!("scriba: authorized realtime client as {}", user.id);
                user
            }
            Err(err) => {
                let msg = ServerMessage::Error(ErrorMessage {
                    code: err.code,
                    message: err.message,
                });
                let Ok(str_msg) = serde_json::to_string(&msg) else {
                    return;
                };
                _ = websocket.send(Message::Text(str_msg)).await;
                return;
            }
        };
        self.hub.send(HubMessage::Connect {
            websocket,
            user: user.id,
        });
    }
}

async fn root() -> &'static str {
    "Scriba api"
}

// Session token, from the bearer header or the `jwt` cookie

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("jwt="))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn with_cookie(mut res: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            res.headers_mut().insert(SET_COOKIE, value);
            res
        }
        Err(err) => scriba_err_response(internal_error(err)),
    }
}

// Websocket handler

#[derive(Deserialize)]
struct RealtimeQuery {
    token: Option<String>,
}

async fn realtime_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<RealtimeQuery>,
    State(scriba): State<Scriba>,
) -> Response {
    let token = query.token.or_else(|| cookie_token(&headers));
    ws.on_upgrade(move |ws| async move { scriba.handle_connect(ws, token).await })
}

// Api auth middleware

async fn require_user(
    State(state): State<Scriba>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(req.headers()) else {
        debug!("scriba: request without session token");
        return scriba_err_response(ScribaError::unauthenticated(
            "You are not logged in",
        ));
    };
    match state.users.authenticate(&token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => scriba_err_response(err),
    }
}

// Api response helpers

#[derive(Serialize)]
struct ScribaErrorBody {
    error: ScribaError,
}

fn scriba_err_response(error: ScribaError) -> Response {
    let status = match error.kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::IdentityMismatch => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = Json(ScribaErrorBody { error });
    (status, body).into_response()
}

fn scriba_response<T>(result: Result<T, ScribaError>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(res) => Json(res).into_response(),
        Err(err) => scriba_err_response(err),
    }
}

// User handlers

async fn register(
    State(state): State<Scriba>,
    Json(payload): Json<Registration>,
) -> Response {
    let res = state.users.register(payload).await;
    scriba_response(res)
}

async fn login(
    State(state): State<Scriba>,
    Json(payload): Json<Login>,
) -> Response {
    match state.users.login(payload).await {
        Ok(res) => {
            let cookie = state.session_cookie(&res.token);
            with_cookie(Json(res).into_response(), &cookie)
        }
        Err(err) => scriba_err_response(err),
    }
}

async fn logout() -> Response {
    let res = Json(serde_json::json!({ "status": "success" })).into_response();
    with_cookie(res, "jwt=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

async fn logged_in(State(state): State<Scriba>, headers: HeaderMap) -> Response {
    let token = session_token(&headers);
    Json(state.users.logged_in(token.as_deref()).await).into_response()
}

async fn get_username(
    State(state): State<Scriba>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.users.get_username(id).await;
    scriba_response(res)
}

async fn change_password(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Json(payload): Json<PasswordChange>,
) -> Response {
    match state.users.change_password(&user, payload).await {
        Ok(res) => {
            let cookie = state.session_cookie(&res.token);
            with_cookie(Json(res).into_response(), &cookie)
        }
        Err(err) => scriba_err_response(err),
    }
}

// Document handlers

async fn list_documents(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
) -> Response {
    let res = state.documents.list_documents(&user).await;
    scriba_response(res)
}

async fn create_document(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateDocument>,
) -> Response {
    let res = state.documents.create_document(&user, payload).await;
    scriba_response(res)
}

async fn get_document(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.documents.get_document(id, &user).await;
    scriba_response(res)
}

async fn get_document_populated(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.documents.get_document_populated(id, &user).await;
    scriba_response(res)
}

async fn get_owner(
    State(state): State<Scriba>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.documents.get_owner(id).await;
    scriba_response(res)
}

async fn update_document(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentPatch>,
) -> Response {
    let res = state.documents.update_document(id, &user, payload).await;
    scriba_response(res)
}

async fn delete_document(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.documents.delete_document(id, &user).await;
    scriba_response(res)
}

// Collaboration handlers

async fn remove_collaborator(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RemoveCollaborator>,
) -> Response {
    let res = state.remove_collaborator(id, payload, &user).await;
    scriba_response(res)
}

async fn accept_access_request(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Response {
    let res = state.accept_access_request(id, payload, &user).await;
    scriba_response(res)
}

// Notification handlers

async fn list_inbox(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
) -> Response {
    let res = state.notifications.list_inbox(user.id).await;
    scriba_response(res)
}

async fn request_access(
    State(state): State<Scriba>,
    Extension(user): Extension<User>,
    Json(payload): Json<RequestAccess>,
) -> Response {
    let res = state.request_access(payload, &user).await;
    scriba_response(res)
}

async fn delete_notification(
    State(state): State<Scriba>,
    Path(id): Path<Uuid>,
) -> Response {
    let res = state.delete_notification(id).await;
    scriba_response(res)
}

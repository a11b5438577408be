use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::credentials::{is_password_changed, Credentials};
use crate::error::{internal_error, ScribaError};
use crate::models;
use crate::store::UserStore;
use crate::types::User;

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Deserialize)]
pub struct Login {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub logged_in: bool,
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
pub struct Username {
    pub username: String,
}

fn validate_password(password: &str, confirm: &str) -> Result<(), ScribaError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ScribaError::bad_request(
            "Password must contain at least 8 characters",
        ));
    }
    if password != confirm {
        return Err(ScribaError::bad_request("Passwords do not match"));
    }
    Ok(())
}

pub struct UsersApi {
    store: Arc<dyn UserStore>,
    credentials: Arc<Credentials>,
    cache: Mutex<LruCache<Uuid, User>>,
}

impl UsersApi {
    pub fn new(store: Arc<dyn UserStore>, credentials: Arc<Credentials>) -> Self {
        Self {
            store,
            credentials,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(5000).expect("non-zero cache size"),
            )),
        }
    }

    async fn get_user_from_cache(&self, id: &Uuid) -> Option<User> {
        let mut cache = self.cache.lock().await;
        cache.get(id).cloned()
    }

    async fn put_user_to_cache(&self, user: User) {
        let mut cache = self.cache.lock().await;
        cache.put(user.id, user);
    }

    async fn remove_user_from_cache(&self, id: &Uuid) {
        let mut cache = self.cache.lock().await;
        cache.pop(id);
    }

    async fn hash_password(&self, password: String) -> Result<String, ScribaError> {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || credentials.hash_password(&password))
            .await
            .map_err(internal_error)?
    }

    async fn verify_password(&self, password: String, hash: String) -> bool {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || {
            credentials.verify_password(&password, &hash)
        })
        .await
        .unwrap_or(false)
    }

    /// Cached lookup. Used for display data only, never for authentication.
    pub async fn get_user(&self, id: Uuid) -> Result<User, ScribaError> {
        if let Some(user) = self.get_user_from_cache(&id).await {
            return Ok(user);
        }
        let Some(user) = self.store.find_by_id(id).await? else {
            return Err(ScribaError::not_found("User not found"));
        };
        self.put_user_to_cache(user.clone()).await;
        Ok(user)
    }

    pub async fn get_username(&self, id: Uuid) -> Result<Username, ScribaError> {
        let user = self.get_user(id).await?;
        Ok(Username {
            username: user.username,
        })
    }

    pub async fn register(
        &self,
        props: Registration,
    ) -> Result<User, ScribaError> {
        let Registration {
            username,
            email,
            password,
            password_confirm,
        } = props;
        let username = username.trim().to_string();
        let email = email.trim().to_string();
        if username.is_empty() {
            return Err(ScribaError::bad_request("Username is required"));
        }
        if email.is_empty() {
            return Err(ScribaError::bad_request("Email is required"));
        }
        validate_password(&password, &password_confirm)?;

        let password_hash = self.hash_password(password).await?;
        let user = self
            .store
            .create(models::NewUser {
                id: Uuid::new_v4(),
                username,
                email,
                password_hash,
                created_at: Utc::now(),
            })
            .await?;
        info!("users: registered {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn login(&self, props: Login) -> Result<TokenResponse, ScribaError> {
        if props.email.is_empty() || props.password.is_empty() {
            return Err(ScribaError::bad_request(
                "Please provide an email and a password",
            ));
        }
        let failed = || ScribaError::unauthenticated("Incorrect email or password");
        let Some(user) = self.store.find_by_email(props.email.trim()).await?
        else {
            debug!("users: login for unknown email");
            return Err(failed());
        };
        let valid = self
            .verify_password(props.password, user.password_hash.clone())
            .await;
        if !valid {
            debug!("users: wrong password for {}", user.id);
            return Err(failed());
        }
        let token = self.credentials.issue(user.id)?;
        Ok(TokenResponse { token, user })
    }

    /// Resolves a session token to a fresh user record.
    pub async fn authenticate(&self, token: &str) -> Result<User, ScribaError> {
        let session = self.credentials.verify(token)?;
        let Some(user) = self.store.find_by_id(session.user_id).await? else {
            debug!("users: token for missing user {}", session.user_id);
            return Err(ScribaError::unauthenticated(
                "The user of this token no longer exists",
            ));
        };
        if is_password_changed(&user, session.issued_at) {
            debug!("users: token predates password change of {}", user.id);
            return Err(ScribaError::unauthenticated(
                "Password was changed, please log in again",
            ));
        }
        Ok(user)
    }

    pub async fn logged_in(&self, token: Option<&str>) -> LoggedIn {
        let user = match token {
            Some(token) => self.authenticate(token).await.ok(),
            None => None,
        };
        LoggedIn {
            logged_in: user.is_some(),
            user,
        }
    }

    pub async fn change_password(
        &self,
        caller: &User,
        props: PasswordChange,
    ) -> Result<TokenResponse, ScribaError> {
        let valid = self
            .verify_password(
                props.current_password,
                caller.password_hash.clone(),
            )
            .await;
        if !valid {
            return Err(ScribaError::unauthenticated(
                "Current password is incorrect",
            ));
        }
        validate_password(&props.password, &props.password_confirm)?;
        let password_hash = self.hash_password(props.password).await?;
        let Some(user) = self
            .store
            .set_password(caller.id, password_hash, Utc::now())
            .await?
        else {
            return Err(ScribaError::not_found("User not found"));
        };
        self.remove_user_from_cache(&user.id).await;
        info!("users: password changed for {}", user.id);
        let token = self.credentials.issue(user.id)?;
        Ok(TokenResponse { token, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;
    use crate::store::memory::MemoryStore;

    fn api() -> UsersApi {
        let credentials =
            Arc::new(Credentials::new("secret", chrono::Duration::days(1), 4));
        UsersApi::new(Arc::new(MemoryStore::new()), credentials)
    }

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_and_login() {
        let api = api();
        let user = api
            .register(registration("alice", "alice@example.com", "password1"))
            .await
            .unwrap();
        let res = api
            .login(Login {
                email: "alice@example.com".to_string(),
                password: "password1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(res.user.id, user.id);
        let authed = api.authenticate(&res.token).await.unwrap();
        assert_eq!(authed.username, "alice");
    }

    #[tokio::test]
    async fn register_validation() {
        let api = api();
        let short = api
            .register(registration("bob", "bob@example.com", "short"))
            .await
            .unwrap_err();
        assert_eq!(short.code, ErrorCode::BadRequest);

        let mut mismatch = registration("bob", "bob@example.com", "password1");
        mismatch.password_confirm = "password2".to_string();
        let err = api.register(mismatch).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);

        api.register(registration("bob", "bob@example.com", "password1"))
            .await
            .unwrap();
        let dup = api
            .register(registration("bob", "other@example.com", "password1"))
            .await
            .unwrap_err();
        assert_eq!(dup.code, ErrorCode::DuplicateUser);
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let api = api();
        api.register(registration("carol", "carol@example.com", "password1"))
            .await
            .unwrap();
        let wrong_password = api
            .login(Login {
                email: "carol@example.com".to_string(),
                password: "password2".to_string(),
            })
            .await
            .unwrap_err();
        let unknown = api
            .login(Login {
                email: "nobody@example.com".to_string(),
                password: "password1".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong_password.code, ErrorCode::Unauthenticated);
        assert_eq!(wrong_password.message, unknown.message);

        let missing = api
            .login(Login {
                email: String::new(),
                password: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code, ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn password_change_revokes_older_tokens() {
        let api = api();
        let user = api
            .register(registration("dave", "dave@example.com", "password1"))
            .await
            .unwrap();
        // token issued in an earlier second than the change
        let old = api.credentials.issue(user.id).unwrap();
        let changed_at = Utc::now() + chrono::Duration::seconds(5);
        api.store
            .set_password(user.id, user.password_hash.clone(), changed_at)
            .await
            .unwrap();
        let err = api.authenticate(&old).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
        assert!(!api.logged_in(Some(&old)).await.logged_in);
    }

    #[tokio::test]
    async fn change_password_returns_working_token() {
        let api = api();
        let user = api
            .register(registration("erin", "erin@example.com", "password1"))
            .await
            .unwrap();
        let wrong = api
            .change_password(
                &user,
                PasswordChange {
                    current_password: "nope-nope".to_string(),
                    password: "password2".to_string(),
                    password_confirm: "password2".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(wrong.code, ErrorCode::Unauthenticated);

        let res = api
            .change_password(
                &user,
                PasswordChange {
                    current_password: "password1".to_string(),
                    password: "password2".to_string(),
                    password_confirm: "password2".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(api.authenticate(&res.token).await.is_ok());
        assert!(api
            .login(Login {
                email: "erin@example.com".to_string(),
                password: "password2".to_string(),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn username_lookup() {
        let api = api();
        let user = api
            .register(registration("frank", "frank@example.com", "password1"))
            .await
            .unwrap();
        assert_eq!(api.get_username(user.id).await.unwrap().username, "frank");
        let err = api.get_username(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}

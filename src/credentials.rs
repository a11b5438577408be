use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{internal_error, ScribaError};
use crate::types::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Identity carried by a valid session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub issued_at: i64,
}

pub struct Credentials {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl Credentials {
    pub fn new(secret: &str, token_ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
            bcrypt_cost,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, ScribaError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(internal_error)
    }

    pub fn verify(&self, token: &str) -> Result<Session, ScribaError> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(Session {
                user_id: data.claims.sub,
                issued_at: data.claims.iat,
            }),
            Err(err) => {
                debug!("credentials: rejected token: {}", err);
                Err(ScribaError::unauthenticated("Invalid or expired token"))
            }
        }
    }

    /// Blocking, run on a blocking thread when called from async code.
    pub fn hash_password(&self, password: &str) -> Result<String, ScribaError> {
        bcrypt::hash(password, self.bcrypt_cost).map_err(internal_error)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

/// True when the password was changed after the token was issued.
/// Compared in whole seconds, the resolution of `iat`.
pub fn is_password_changed(user: &User, issued_at: i64) -> bool {
    match user.password_changed_at {
        Some(changed_at) => issued_at < changed_at.timestamp(),
        None => false,
    }
}

use log::error;

use crate::protocol::{ErrorCode, ErrorKind};

#[derive(serde::Serialize, Debug, Clone)]
pub struct ScribaError {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl ScribaError {
    pub fn new(code: ErrorCode, msg: &str) -> Self {
        Self {
            code,
            kind: code.kind(),
            message: msg.to_string(),
        }
    }
    pub fn bad_request(msg: &str) -> Self {
        Self::new(ErrorCode::BadRequest, msg)
    }
    pub fn unauthenticated(msg: &str) -> Self {
        Self::new(ErrorCode::Unauthenticated, msg)
    }
    pub fn not_found(msg: &str) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }
    pub fn forbidden(msg: &str) -> Self {
        Self::new(ErrorCode::Forbidden, msg)
    }
    pub fn identity_mismatch(msg: &str) -> Self {
        Self::new(ErrorCode::IdentityMismatch, msg)
    }
    pub fn internal(msg: &str) -> Self {
        Self::new(ErrorCode::InternalServerError, msg)
    }
}

impl std::fmt::Display for ScribaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Utility function for mapping any error into an Internal Server Error
pub fn internal_error<E>(err: E) -> ScribaError
where
    E: std::error::Error,
{
    error!("internal error: {:?}", err);
    ScribaError::internal(&err.to_string())
}

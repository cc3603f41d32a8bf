//! Shared error type across banlist crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, BanlistError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum BanlistError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl BanlistError {
    /// Stable machine-readable code, used in logs and tests.
    pub fn code(&self) -> &'static str {
        match self {
            BanlistError::BadRequest(_) => "BAD_REQUEST",
            BanlistError::InvalidUserId(_) => "INVALID_USER_ID",
            BanlistError::UnsupportedVersion => "UNSUPPORTED_VERSION",
            BanlistError::Store(_) => "STORE",
            BanlistError::Internal(_) => "INTERNAL",
        }
    }
}

//! Error types shared by every Quaich crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuaichError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),
}

impl QuaichError {
    /// `true` for the not-found case, which callers frequently treat as
    /// an expected branch rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuaichError::NotFound { .. })
    }
}

pub type QuaichResult<T> = Result<T, QuaichError>;

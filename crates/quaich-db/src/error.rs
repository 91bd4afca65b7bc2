//! Database-specific error types and conversions.

use quaich_core::error::QuaichError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// A stored row that cannot be mapped back to its domain model.
    #[error("Corrupt {entity} record: {message}")]
    Corrupt { entity: String, message: String },
}

impl DbError {
    /// Classify the error returned by `Response::check()`. Unique-index
    /// and duplicate-record-id violations become `AlreadyExists`.
    pub(crate) fn from_check(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already exists") || message.contains("already contains") {
            DbError::AlreadyExists {
                entity: entity.to_string(),
            }
        } else {
            DbError::Migration(message)
        }
    }
}

impl From<DbError> for QuaichError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => QuaichError::NotFound { entity, id },
            DbError::AlreadyExists { entity } => QuaichError::AlreadyExists { entity },
            DbError::Hashing(message) => QuaichError::Crypto(message),
            other => QuaichError::Database(other.to_string()),
        }
    }
}

//! Settings error types.

use quaich_core::error::QuaichError;
use quaich_core::models::setting::DataType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The candidate value failed one of the setting's rules.
    #[error("invalid value for setting {key}: {message}")]
    Validation { key: String, message: String },

    #[error("setting {key} is read-only")]
    ReadonlyViolation { key: String },

    #[error("cannot store value for setting {key} as {data_type}: {message}")]
    Serialization {
        key: String,
        data_type: DataType,
        message: String,
    },

    #[error("setting {key} not found")]
    NotFound { key: String },

    #[error("setting {key} already exists")]
    AlreadyExists { key: String },

    #[error(transparent)]
    Store(#[from] QuaichError),
}

impl SettingsError {
    /// Expected, caller-correctable outcomes (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SettingsError::Store(_))
    }
}

pub type SettingsResult<T> = Result<T, SettingsError>;

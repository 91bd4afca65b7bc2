//! Authentication error types.
//!
//! Every expected outcome of a login, session or 2FA call is a variant
//! here. Only `Crypto` and store failures correspond to a server error.

use std::fmt;

use quaich_core::error::QuaichError;
use quaich_settings::SettingsError;
use serde::Serialize;
use thiserror::Error;

/// Why a session token stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryReason {
    /// Older than `session_timeout` hours.
    Absolute,
    /// No activity for `idle_timeout` minutes.
    Idle,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryReason::Absolute => f.write_str("ABSOLUTE"),
            ExpiryReason::Idle => f.write_str("IDLE"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong password or unknown account; the two are indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked, try again in {remaining_minutes} minute(s)")]
    AccountLocked { remaining_minutes: i64 },

    #[error("account is not active")]
    AccountInactive,

    #[error("e-mail address has not been verified")]
    EmailNotVerified,

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("session expired ({reason})")]
    SessionExpired { reason: ExpiryReason },

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// Password accepted; the caller must finish with a 2FA code and
    /// the challenge token.
    #[error("two-factor verification required")]
    TwoFactorRequired {
        challenge_token: String,
        expires_in: u64,
    },

    /// Bad TOTP code and bad backup code alike.
    #[error("invalid two-factor token")]
    TwoFactorInvalid,

    #[error("two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("password does not meet the policy: {}", errors.join("; "))]
    PasswordPolicy { errors: Vec<String> },

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Store(#[from] QuaichError),
}

impl AuthError {
    /// Expected, caller-facing outcomes (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        match self {
            AuthError::Crypto(_) => false,
            AuthError::Settings(e) => e.is_client_error(),
            AuthError::Store(e) => matches!(
                e,
                QuaichError::AlreadyExists { .. } | QuaichError::NotFound { .. }
            ),
            _ => true,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    Member,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Member => "Member",
            UserRole::Moderator => "Moderator",
            UserRole::Admin => "Admin",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    /// Registered but waiting for an administrator to approve membership.
    PendingApproval,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "Active",
            UserStatus::PendingApproval => "PendingApproval",
            UserStatus::Suspended => "Suspended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub failed_login_attempts: u32,
    pub account_locked_until: Option<DateTime<Utc>>,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    /// TOTP secret, AES-256-GCM encrypted when an MFA key is configured.
    pub two_factor_secret: Option<String>,
    /// SHA-256 digests of the unused backup codes.
    pub two_factor_backup_codes: Vec<String>,
    pub two_factor_last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Local part of an e-mail address (before `@`).
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: UserRole,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub email_verified: Option<bool>,
}

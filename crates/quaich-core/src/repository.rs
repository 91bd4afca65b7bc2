//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must give
//! read-after-write consistency: settings gate security decisions, so
//! there is no caching layer between these traits and the store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QuaichResult;
use crate::models::{
    setting::{CreateSetting, Setting},
    user::{CreateUser, UpdateUser, User},
};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub trait SettingRepository: Send + Sync {
    /// Insert a new setting. Fails with `AlreadyExists` if the key is taken.
    fn create(&self, input: CreateSetting) -> impl Future<Output = QuaichResult<Setting>> + Send;
    fn get_by_key(&self, key: &str) -> impl Future<Output = QuaichResult<Setting>> + Send;
    /// Batch lookup; keys that do not exist are simply absent from the result.
    fn get_many(&self, keys: &[&str]) -> impl Future<Output = QuaichResult<Vec<Setting>>> + Send;
    fn update_value(
        &self,
        key: &str,
        value: Option<String>,
    ) -> impl Future<Output = QuaichResult<Setting>> + Send;
    fn list_by_category(
        &self,
        category: &str,
    ) -> impl Future<Output = QuaichResult<Vec<Setting>>> + Send;
    fn list(&self) -> impl Future<Output = QuaichResult<Vec<Setting>>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = QuaichResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = QuaichResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = QuaichResult<User>> + Send;
    fn get_by_username(&self, username: &str)
    -> impl Future<Output = QuaichResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = QuaichResult<User>> + Send;
    fn update(&self, id: Uuid, input: UpdateUser)
    -> impl Future<Output = QuaichResult<User>> + Send;
    /// Re-hash and store a new password.
    fn update_password(
        &self,
        id: Uuid,
        password: &str,
    ) -> impl Future<Output = QuaichResult<()>> + Send;

    // -- login failure tracking ------------------------------------------

    /// Atomically increment `failed_login_attempts`, stamp
    /// `last_failed_login`, and return the new count.
    fn record_failed_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = QuaichResult<u32>> + Send;
    fn lock_until(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> impl Future<Output = QuaichResult<()>> + Send;
    /// Zero the failure counter and clear both lockout timestamps.
    fn reset_login_failures(&self, id: Uuid) -> impl Future<Output = QuaichResult<()>> + Send;

    // -- two-factor ------------------------------------------------------

    /// Persist secret and hashed backup codes together and flip
    /// `two_factor_enabled` on.
    fn enable_two_factor(
        &self,
        id: Uuid,
        secret: String,
        backup_code_hashes: Vec<String>,
    ) -> impl Future<Output = QuaichResult<()>> + Send;
    fn disable_two_factor(&self, id: Uuid) -> impl Future<Output = QuaichResult<()>> + Send;
    fn replace_backup_codes(
        &self,
        id: Uuid,
        backup_code_hashes: Vec<String>,
    ) -> impl Future<Output = QuaichResult<()>> + Send;
    /// Remove `code_hash` from the stored backup codes if present.
    /// Returns `true` only for the caller that actually removed it.
    fn consume_backup_code(
        &self,
        id: Uuid,
        code_hash: &str,
    ) -> impl Future<Output = QuaichResult<bool>> + Send;
    /// Record a second factor accepted at `at`. With `unused_since`, the
    /// write only happens when no use is recorded at or after that instant.
    /// Returns whether the use was recorded.
    fn claim_two_factor_use(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        unused_since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = QuaichResult<bool>> + Send;
}

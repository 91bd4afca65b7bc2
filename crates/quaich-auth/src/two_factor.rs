//! Two-factor verification: setup, enablement, login verification and
//! the password-plus-token guarded management operations.
//!
//! Every failed token check surfaces as the same `TwoFactorInvalid`,
//! whatever the token looked like. A TOTP code is accepted once per time
//! step: the last accepted use is kept on the user and every new use is
//! recorded with a conditional write.

use chrono::{DateTime, Utc};
use quaich_core::models::user::User;
use quaich_core::repository::UserRepository;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::password;
use crate::totp;

/// Material handed to the user while 2FA is pending setup. Nothing of it
/// is stored until [`TwoFactorService::enable`] succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    /// Base32 TOTP secret.
    pub secret: String,
    /// `otpauth://` URI for QR rendering.
    pub qr_payload: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMethod {
    Totp,
    Backup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TwoFactorVerification {
    pub method: VerificationMethod,
    /// Only reported when a backup code was spent.
    pub remaining_backup_codes: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub remaining_backup_codes: usize,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TwoFactorService<U: UserRepository> {
    users: U,
    config: AuthConfig,
}

impl<U: UserRepository> TwoFactorService<U> {
    pub fn new(users: U, config: AuthConfig) -> Self {
        Self { users, config }
    }

    /// Fresh secret, QR payload and backup codes for `user_id`.
    pub async fn generate_setup(&self, user_id: Uuid) -> AuthResult<TwoFactorSetup> {
        let user = self.users.get_by_id(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let (secret, qr_payload) =
            totp::generate_enrollment(&self.config.totp_issuer, &user.email)?;
        let backup_codes = totp::generate_backup_codes(self.config.backup_code_count);
        debug!(user_id = %user_id, "Generated two-factor setup");

        Ok(TwoFactorSetup {
            secret,
            qr_payload,
            backup_codes,
        })
    }

    pub async fn enable(
        &self,
        user_id: Uuid,
        password: &str,
        setup: &TwoFactorSetup,
        token: &str,
    ) -> AuthResult<()> {
        self.enable_at(user_id, password, setup, token, Utc::now())
            .await
    }

    /// Confirm a pending setup with the current password and a code from
    /// the authenticator, then store secret and backup-code digests in
    /// one write.
    pub async fn enable_at(
        &self,
        user_id: Uuid,
        password: &str,
        setup: &TwoFactorSetup,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let user = self.users.get_by_id(user_id).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }
        self.check_password(&user, password)?;

        let secret_bytes = totp::decode_base32(&setup.secret)?;
        if self.totp_step(&secret_bytes, &user, token, now)?.is_none() {
            return Err(AuthError::TwoFactorInvalid);
        }

        let sealed = totp::seal_secret(self.config.mfa_encryption_key.as_ref(), &secret_bytes)?;
        let hashes = setup
            .backup_codes
            .iter()
            .map(|c| totp::hash_backup_code(c))
            .collect();
        self.users.enable_two_factor(user_id, sealed, hashes).await?;
        // The confirmation code counts as used.
        self.users.claim_two_factor_use(user_id, now, None).await?;

        info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(())
    }

    pub async fn verify(&self, user: &User, token: &str) -> AuthResult<TwoFactorVerification> {
        self.verify_at(user, token, Utc::now()).await
    }

    /// TOTP first, then a backup code. A matching backup code is consumed.
    pub async fn verify_at(
        &self,
        user: &User,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<TwoFactorVerification> {
        self.verify_since(user, token, None, now).await
    }

    /// Like [`verify_at`](Self::verify_at), and also fails when a second
    /// factor was accepted at or after `not_before`.
    pub(crate) async fn verify_since(
        &self,
        user: &User,
        token: &str,
        not_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AuthResult<TwoFactorVerification> {
        let stored = match (&user.two_factor_secret, user.two_factor_enabled) {
            (Some(secret), true) => secret,
            _ => return Err(AuthError::TwoFactorNotEnabled),
        };
        let secret_bytes = totp::open_secret(self.config.mfa_encryption_key.as_ref(), stored)?;

        if let Some(step) = self.totp_step(&secret_bytes, user, token, now)? {
            let cutoff = i64::try_from(totp::reuse_cutoff(step))
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or(now);
            let unused_since = not_before.map_or(cutoff, |nb| nb.min(cutoff));
            if self
                .users
                .claim_two_factor_use(user.id, now, Some(unused_since))
                .await?
            {
                return Ok(TwoFactorVerification {
                    method: VerificationMethod::Totp,
                    remaining_backup_codes: None,
                });
            }
            warn!(user_id = %user.id, step, "TOTP code already used");
            return Err(AuthError::TwoFactorInvalid);
        }

        if totp::is_backup_code_format(token) {
            let hash = totp::hash_backup_code(token);
            if self.users.consume_backup_code(user.id, &hash).await? {
                if !self
                    .users
                    .claim_two_factor_use(user.id, now, not_before)
                    .await?
                {
                    warn!(user_id = %user.id, "Second factor already accepted for this login");
                    return Err(AuthError::TwoFactorInvalid);
                }
                let remaining = self
                    .users
                    .get_by_id(user.id)
                    .await?
                    .two_factor_backup_codes
                    .len();
                info!(user_id = %user.id, remaining, "Backup code consumed");
                return Ok(TwoFactorVerification {
                    method: VerificationMethod::Backup,
                    remaining_backup_codes: Some(remaining),
                });
            }
        }

        warn!(user_id = %user.id, "Two-factor verification failed");
        Err(AuthError::TwoFactorInvalid)
    }

    pub async fn disable(&self, user_id: Uuid, password: &str, token: &str) -> AuthResult<()> {
        self.disable_at(user_id, password, token, Utc::now()).await
    }

    pub async fn disable_at(
        &self,
        user_id: Uuid,
        password: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let user = self.reauthenticate(user_id, password, token, now).await?;
        self.users.disable_two_factor(user.id).await?;
        info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }

    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        password: &str,
        token: &str,
    ) -> AuthResult<Vec<String>> {
        self.regenerate_backup_codes_at(user_id, password, token, Utc::now())
            .await
    }

    /// Replace every stored backup code. Returns the new plaintext codes.
    pub async fn regenerate_backup_codes_at(
        &self,
        user_id: Uuid,
        password: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<String>> {
        let user = self.reauthenticate(user_id, password, token, now).await?;
        let codes = totp::generate_backup_codes(self.config.backup_code_count);
        let hashes = codes.iter().map(|c| totp::hash_backup_code(c)).collect();
        self.users.replace_backup_codes(user.id, hashes).await?;
        info!(user_id = %user_id, count = codes.len(), "Backup codes regenerated");
        Ok(codes)
    }

    pub async fn status(&self, user_id: Uuid) -> AuthResult<TwoFactorStatus> {
        let user = self.users.get_by_id(user_id).await?;
        Ok(TwoFactorStatus {
            enabled: user.two_factor_enabled,
            remaining_backup_codes: user.two_factor_backup_codes.len(),
            last_used: user.two_factor_last_used,
        })
    }

    /// Current password and a valid second factor, both required.
    async fn reauthenticate(
        &self,
        user_id: Uuid,
        password: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<User> {
        let user = self.users.get_by_id(user_id).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }
        self.check_password(&user, password)?;
        self.verify_at(&user, token, now).await?;
        Ok(user)
    }

    fn check_password(&self, user: &User, password: &str) -> AuthResult<()> {
        let pepper = self.config.pepper.as_deref();
        if password::verify_password(password, &user.password_hash, pepper)? {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    fn totp_step(
        &self,
        secret_bytes: &[u8],
        user: &User,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<u64>> {
        let unix = u64::try_from(now.timestamp()).unwrap_or(0);
        totp::matching_step(
            secret_bytes,
            token,
            &self.config.totp_issuer,
            &user.email,
            unix,
        )
    }
}

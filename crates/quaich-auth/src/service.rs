//! Authentication service: login orchestration, registration, password
//! changes and session validation.
//!
//! Login runs lockout check → password check → account state → 2FA
//! check → session issuance, each decision reading the security settings
//! resolved at the start of the call.

use chrono::{DateTime, Utc};
use quaich_core::error::QuaichError;
use quaich_core::models::user::{CreateUser, User, UserRole, UserStatus};
use quaich_core::repository::{SettingRepository, UserRepository};
use quaich_settings::defaults::keys;
use quaich_settings::{SecuritySettingsResolver, SecuritySettingsSnapshot, SettingStore};
use tracing::{debug, info};
use uuid::Uuid;

use crate::complexity;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::lockout::LockoutPolicy;
use crate::password;
use crate::session::{SessionManager, ValidatedSession};
use crate::two_factor::{TwoFactorService, VerificationMethod};

#[derive(Debug)]
pub struct LoginInput {
    /// Username or e-mail address.
    pub identifier: String,
    pub password: String,
}

/// Successful, complete login.
#[derive(Debug)]
pub struct LoginOutput {
    pub session_token: String,
    pub user_id: Uuid,
    pub role: UserRole,
    /// Second factor used, if one was required.
    pub two_factor_method: Option<VerificationMethod>,
    pub remaining_backup_codes: Option<usize>,
}

#[derive(Debug)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Authentication service.
///
/// Generic over repository implementations so the auth layer has no
/// dependency on the database crate.
pub struct AuthService<U: UserRepository + Clone, S: SettingRepository + Clone> {
    users: U,
    settings: SettingStore<S>,
    resolver: SecuritySettingsResolver<S>,
    sessions: SessionManager,
    two_factor: TwoFactorService<U>,
    config: AuthConfig,
}

impl<U: UserRepository + Clone, S: SettingRepository + Clone> AuthService<U, S> {
    pub fn new(users: U, settings: S, config: AuthConfig) -> Self {
        Self {
            two_factor: TwoFactorService::new(users.clone(), config.clone()),
            sessions: SessionManager::new(&config),
            resolver: SecuritySettingsResolver::new(settings.clone()),
            settings: SettingStore::new(settings),
            users,
            config,
        }
    }

    pub fn settings(&self) -> &SettingStore<S> {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn two_factor(&self) -> &TwoFactorService<U> {
        &self.two_factor
    }

    pub async fn security_settings(&self) -> SecuritySettingsSnapshot {
        self.resolver.resolve().await
    }

    pub async fn login(&self, input: LoginInput) -> AuthResult<LoginOutput> {
        self.login_at(input, Utc::now()).await
    }

    pub async fn login_at(&self, input: LoginInput, now: DateTime<Utc>) -> AuthResult<LoginOutput> {
        let snapshot = self.resolver.resolve().await;
        let policy = LockoutPolicy::from_snapshot(&snapshot);

        // 1. Look up user, username first then e-mail.
        let user = self.find_user(&input.identifier).await?;

        // 2. A locked account is rejected before the password is looked at.
        policy.check(&user, now)?;

        // 3. Verify password.
        let valid = password::verify_password(
            &input.password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            policy.record_failure(&self.users, &user, now).await?;
            return Err(AuthError::InvalidCredentials);
        }

        // 4. Account state.
        if user.status != UserStatus::Active {
            return Err(AuthError::AccountInactive);
        }
        if snapshot.require_email_verification && !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        // 5. Second factor, only when both the site and the user have it on.
        if snapshot.enable_two_factor_auth && user.two_factor_enabled {
            let challenge_token = self.sessions.issue_challenge_at(user.id, now)?;
            debug!(user_id = %user.id, "Password accepted, awaiting second factor");
            return Err(AuthError::TwoFactorRequired {
                challenge_token,
                expires_in: self.sessions.challenge_lifetime_secs(),
            });
        }

        // 6. Issue session.
        policy.record_success(&self.users, &user).await?;
        let session_token = self.sessions.issue_at(&user, now)?;
        info!(user_id = %user.id, "User logged in");

        Ok(LoginOutput {
            session_token,
            user_id: user.id,
            role: user.role,
            two_factor_method: None,
            remaining_backup_codes: None,
        })
    }

    pub async fn complete_two_factor(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> AuthResult<LoginOutput> {
        self.complete_two_factor_at(challenge_token, code, Utc::now())
            .await
    }

    /// Finish a login that returned `TwoFactorRequired`.
    ///
    /// A wrong code counts as a failed login for the lockout. A challenge
    /// is spent once any second factor has been accepted since it was
    /// issued.
    pub async fn complete_two_factor_at(
        &self,
        challenge_token: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<LoginOutput> {
        let challenge = self.sessions.verify_challenge_at(challenge_token, now)?;
        let snapshot = self.resolver.resolve().await;
        let policy = LockoutPolicy::from_snapshot(&snapshot);

        let user = self.users.get_by_id(challenge.user_id).await?;
        policy.check(&user, now)?;
        if user.status != UserStatus::Active {
            return Err(AuthError::AccountInactive);
        }
        if user
            .two_factor_last_used
            .is_some_and(|used| used >= challenge.issued_at)
        {
            return Err(AuthError::TokenInvalid("challenge already used".into()));
        }

        let verification = match self
            .two_factor
            .verify_since(&user, code, Some(challenge.issued_at), now)
            .await
        {
            Ok(verification) => verification,
            Err(AuthError::TwoFactorInvalid) => {
                policy.record_failure(&self.users, &user, now).await?;
                return Err(AuthError::TwoFactorInvalid);
            }
            Err(e) => return Err(e),
        };

        policy.record_success(&self.users, &user).await?;
        let session_token = self.sessions.issue_at(&user, now)?;
        info!(
            user_id = %user.id,
            method = ?verification.method,
            "User logged in with second factor"
        );

        Ok(LoginOutput {
            session_token,
            user_id: user.id,
            role: user.role,
            two_factor_method: Some(verification.method),
            remaining_backup_codes: verification.remaining_backup_codes,
        })
    }

    /// Create a member account. New accounts wait for approval when the
    /// club requires it.
    pub async fn register(&self, input: RegisterInput) -> AuthResult<User> {
        let open = self
            .settings
            .get(keys::ALLOW_REGISTRATION)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        if !open {
            return Err(AuthError::RegistrationClosed);
        }

        let snapshot = self.resolver.resolve().await;
        self.enforce_policy(&snapshot, &input.password, &input.username, &input.email)?;

        let needs_approval = self
            .settings
            .get(keys::REQUIRE_ADMIN_APPROVAL)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let status = if needs_approval {
            UserStatus::PendingApproval
        } else {
            UserStatus::Active
        };

        let user = self
            .users
            .create(CreateUser {
                username: input.username,
                email: input.email,
                password: input.password,
                role: UserRole::Member,
                status,
            })
            .await?;

        info!(user_id = %user.id, status = user.status.as_str(), "User registered");
        Ok(user)
    }

    /// Replace a password after re-checking the current one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let user = self.users.get_by_id(user_id).await?;
        let valid = password::verify_password(
            current_password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        let snapshot = self.resolver.resolve().await;
        self.enforce_policy(&snapshot, new_password, &user.username, &user.email)?;

        self.users.update_password(user_id, new_password).await?;
        info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    pub async fn validate_session(&self, token: &str) -> AuthResult<ValidatedSession> {
        self.validate_session_at(token, Utc::now()).await
    }

    /// Validate against the timeouts in force right now.
    pub async fn validate_session_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<ValidatedSession> {
        let snapshot = self.resolver.resolve().await;
        self.sessions.validate_at(token, &snapshot, now)
    }

    /// Validate and return a token with refreshed idle tracking.
    pub async fn touch_session_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<String> {
        let session = self.validate_session_at(token, now).await?;
        self.sessions.touch_at(&session, now)
    }

    /// Admin action: clear a lock and the failure counter.
    pub async fn unlock_account(&self, user_id: Uuid) -> AuthResult<()> {
        self.users.reset_login_failures(user_id).await?;
        info!(user_id = %user_id, "Account unlocked");
        Ok(())
    }

    async fn find_user(&self, identifier: &str) -> AuthResult<User> {
        match self.users.get_by_username(identifier).await {
            Ok(user) => Ok(user),
            Err(QuaichError::NotFound { .. }) => match self.users.get_by_email(identifier).await {
                Ok(user) => Ok(user),
                Err(QuaichError::NotFound { .. }) => Err(AuthError::InvalidCredentials),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn enforce_policy(
        &self,
        snapshot: &SecuritySettingsSnapshot,
        password: &str,
        username: &str,
        email: &str,
    ) -> AuthResult<()> {
        let rules = snapshot.effective_password_rules();
        let check = complexity::validate(password, Some(&rules), Some(username), Some(email));
        if check.is_valid {
            Ok(())
        } else {
            Err(AuthError::PasswordPolicy {
                errors: check.errors,
            })
        }
    }
}

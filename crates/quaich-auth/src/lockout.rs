//! Account lockout state machine.
//!
//! An account is `Locked` while `account_locked_until` lies in the future
//! and `Unlocked` otherwise. Expiry is never written back by a timer: the
//! predicate is evaluated against the clock on every attempt.

use chrono::{DateTime, Duration, Utc};
use quaich_core::models::user::User;
use quaich_core::repository::UserRepository;
use quaich_settings::SecuritySettingsSnapshot;
use tracing::{info, warn};

use crate::error::{AuthError, AuthResult};

/// Lockout parameters taken from one resolved settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub attempt_limit: u32,
    pub lockout_duration: Duration,
}

impl LockoutPolicy {
    pub fn from_snapshot(snapshot: &SecuritySettingsSnapshot) -> Self {
        Self {
            attempt_limit: snapshot.login_attempt_limit,
            lockout_duration: Duration::minutes(i64::from(
                snapshot.account_lockout_duration_minutes,
            )),
        }
    }

    /// Reject with `AccountLocked` if the account is locked at `now`.
    pub fn check(&self, user: &User, now: DateTime<Utc>) -> AuthResult<()> {
        match user.account_locked_until {
            Some(until) if is_locked(Some(until), now) => Err(AuthError::AccountLocked {
                remaining_minutes: remaining_minutes(until, now),
            }),
            _ => Ok(()),
        }
    }

    /// Count a failed password check. Locks the account once the
    /// post-increment counter reaches the limit.
    pub async fn record_failure<U: UserRepository>(
        &self,
        users: &U,
        user: &User,
        now: DateTime<Utc>,
    ) -> AuthResult<FailureOutcome> {
        // A lock that has run out starts a fresh allowance.
        if user
            .account_locked_until
            .is_some_and(|until| !is_locked(Some(until), now))
        {
            users.reset_login_failures(user.id).await?;
        }

        let attempts = users.record_failed_login(user.id, now).await?;
        warn!(user_id = %user.id, attempts, "Failed login attempt");

        if attempts >= self.attempt_limit {
            let until = now + self.lockout_duration;
            users.lock_until(user.id, until).await?;
            info!(
                user_id = %user.id,
                attempts,
                locked_until = %until,
                "Account locked"
            );
            return Ok(FailureOutcome {
                attempts,
                locked_until: Some(until),
            });
        }

        Ok(FailureOutcome {
            attempts,
            locked_until: None,
        })
    }

    /// Clear the failure state after a complete authentication.
    pub async fn record_success<U: UserRepository>(
        &self,
        users: &U,
        user: &User,
    ) -> AuthResult<()> {
        if user.failed_login_attempts > 0
            || user.account_locked_until.is_some()
            || user.last_failed_login.is_some()
        {
            users.reset_login_failures(user.id).await?;
        }
        Ok(())
    }
}

/// Result of counting one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub attempts: u32,
    /// Set when this failure tripped the lock.
    pub locked_until: Option<DateTime<Utc>>,
}

/// `locked_until` is set and still in the future.
pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    locked_until.is_some_and(|until| until > now)
}

/// Whole minutes left on a lock, rounded up.
pub fn remaining_minutes(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (locked_until - now).num_milliseconds().max(0);
    (millis + 59_999) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use quaich_core::models::user::{UserRole, UserStatus};
    use uuid::Uuid;

    fn user(locked_until: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "islay".into(),
            email: "islay@example.com".into(),
            password_hash: String::new(),
            role: UserRole::Member,
            status: UserStatus::Active,
            email_verified: true,
            failed_login_attempts: 0,
            account_locked_until: locked_until,
            last_failed_login: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_backup_codes: Vec::new(),
            two_factor_last_used: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_predicate() {
        let now = Utc::now();
        assert!(!is_locked(None, now));
        assert!(!is_locked(Some(now - Duration::seconds(1)), now));
        assert!(!is_locked(Some(now), now));
        assert!(is_locked(Some(now + Duration::seconds(1)), now));
    }

    #[test]
    fn remaining_minutes_round_up() {
        let now = Utc::now();
        assert_eq!(remaining_minutes(now + Duration::minutes(30), now), 30);
        assert_eq!(remaining_minutes(now + Duration::seconds(61), now), 2);
        assert_eq!(remaining_minutes(now + Duration::seconds(1), now), 1);
        assert_eq!(remaining_minutes(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn check_reports_remaining_time() {
        let now = Utc::now();
        let policy = LockoutPolicy::from_snapshot(&SecuritySettingsSnapshot::default());
        let locked = user(Some(now + Duration::minutes(10)));
        match policy.check(&locked, now) {
            Err(AuthError::AccountLocked { remaining_minutes }) => {
                assert_eq!(remaining_minutes, 10)
            }
            other => panic!("expected AccountLocked, got {other:?}"),
        }
        let expired = user(Some(now - Duration::minutes(1)));
        assert!(policy.check(&expired, now).is_ok());
    }

    #[test]
    fn policy_mirrors_snapshot() {
        let snapshot = SecuritySettingsSnapshot {
            login_attempt_limit: 3,
            account_lockout_duration_minutes: 15,
            ..Default::default()
        };
        let policy = LockoutPolicy::from_snapshot(&snapshot);
        assert_eq!(policy.attempt_limit, 3);
        assert_eq!(policy.lockout_duration, Duration::minutes(15));
    }
}

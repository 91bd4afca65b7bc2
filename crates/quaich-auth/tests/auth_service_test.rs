//! Login, lockout, sessions and two-factor flows against in-memory SurrealDB.

use chrono::{DateTime, Duration, Utc};
use quaich_auth::{
    AuthConfig, AuthError, AuthService, ExpiryReason, LoginInput, RateLimitKey, RateLimiter,
    RegisterInput, TwoFactorSetup, VerificationMethod,
};
use quaich_core::models::setting::DataType;
use quaich_core::models::user::{CreateUser, User, UserRole, UserStatus};
use quaich_core::repository::UserRepository;
use quaich_db::repository::{SurrealSettingRepository, SurrealUserRepository};
use quaich_settings::SetOptions;
use quaich_settings::defaults::keys;
use serde_json::{Value, json};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use totp_rs::{Algorithm, Secret, TOTP};

type Service = AuthService<SurrealUserRepository<Db>, SurrealSettingRepository<Db>>;

const PASSWORD: &str = "Glen-Moray-1897";

async fn setup() -> (Service, SurrealUserRepository<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    quaich_db::run_migrations(&db).await.unwrap();

    let users = SurrealUserRepository::new(db.clone());
    let settings = SurrealSettingRepository::new(db);
    let config = AuthConfig {
        jwt_secret: "integration-test-secret".into(),
        mfa_encryption_key: Some([9u8; 32]),
        ..AuthConfig::default()
    };
    (AuthService::new(users.clone(), settings, config), users)
}

async fn set(service: &Service, key: &str, value: Value) {
    let data_type = match value {
        Value::Bool(_) => DataType::Boolean,
        Value::Number(_) => DataType::Number,
        _ => DataType::String,
    };
    service
        .settings()
        .set(
            key,
            &value,
            SetOptions {
                data_type: Some(data_type),
                category: Some("security".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

async fn member(users: &SurrealUserRepository<Db>) -> User {
    users
        .create(CreateUser {
            username: "ugie".into(),
            email: "ugie@example.com".into(),
            password: PASSWORD.into(),
            role: UserRole::Member,
            status: UserStatus::Active,
        })
        .await
        .unwrap()
}

fn login(identifier: &str, password: &str) -> LoginInput {
    LoginInput {
        identifier: identifier.into(),
        password: password.into(),
    }
}

fn code_at(setup: &TwoFactorSetup, email: &str, at: DateTime<Utc>) -> String {
    let bytes = Secret::Encoded(setup.secret.clone()).to_bytes().unwrap();
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some("Quaich".into()),
        email.into(),
    )
    .unwrap()
    .generate(at.timestamp() as u64)
}

/// Enable 2FA for `user` and return the setup it was enabled with.
async fn enable_two_factor(service: &Service, user: &User, now: DateTime<Utc>) -> TwoFactorSetup {
    let setup = service.two_factor().generate_setup(user.id).await.unwrap();
    let code = code_at(&setup, &user.email, now);
    service
        .two_factor()
        .enable_at(user.id, PASSWORD, &setup, &code, now)
        .await
        .unwrap();
    setup
}

/// Log in with the password and return the two-factor challenge.
async fn challenge_at(service: &Service, at: DateTime<Utc>) -> String {
    match service.login_at(login("ugie", PASSWORD), at).await {
        Err(AuthError::TwoFactorRequired {
            challenge_token, ..
        }) => challenge_token,
        other => panic!("expected TwoFactorRequired, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Login and lockout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_by_username_or_email() {
    let (service, users) = setup().await;
    let user = member(&users).await;

    let by_name = service.login(login("ugie", PASSWORD)).await.unwrap();
    assert_eq!(by_name.user_id, user.id);
    assert_eq!(by_name.role, UserRole::Member);
    assert!(by_name.two_factor_method.is_none());

    let by_email = service
        .login(login("ugie@example.com", PASSWORD))
        .await
        .unwrap();
    assert_eq!(by_email.user_id, user.id);

    let session = service
        .validate_session(&by_email.session_token)
        .await
        .unwrap();
    assert_eq!(session.user_id, user.id);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_the_same() {
    let (service, users) = setup().await;
    member(&users).await;

    let unknown = service.login(login("nobody", PASSWORD)).await.unwrap_err();
    let wrong = service.login(login("ugie", "nope")).await.unwrap_err();
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn third_failure_locks_the_account() {
    let (service, users) = setup().await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(3)).await;
    set(&service, keys::ACCOUNT_LOCKOUT_DURATION, json!(30)).await;
    let user = member(&users).await;
    let now = Utc::now();

    for attempt in 1..=3 {
        let err = service
            .login_at(login("ugie", "wrong"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials), "attempt {attempt}");
    }

    let stored = users.get_by_id(user.id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 3);
    assert!(stored.account_locked_until.is_some());

    // Correct password, still locked.
    match service.login_at(login("ugie", PASSWORD), now).await {
        Err(AuthError::AccountLocked { remaining_minutes }) => assert_eq!(remaining_minutes, 30),
        other => panic!("expected AccountLocked, got {other:?}"),
    }

    // Locked attempts are not counted.
    let stored = users.get_by_id(user.id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 3);
}

#[tokio::test]
async fn below_limit_stays_unlocked() {
    let (service, users) = setup().await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(3)).await;
    member(&users).await;
    let now = Utc::now();

    for _ in 0..2 {
        let _ = service.login_at(login("ugie", "wrong"), now).await;
    }
    let out = service.login_at(login("ugie", PASSWORD), now).await.unwrap();

    let stored = users.get_by_id(out.user_id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.last_failed_login.is_none());
}

#[tokio::test]
async fn lock_expires_on_its_own() {
    let (service, users) = setup().await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(2)).await;
    set(&service, keys::ACCOUNT_LOCKOUT_DURATION, json!(10)).await;
    let user = member(&users).await;
    let now = Utc::now();

    for _ in 0..2 {
        let _ = service.login_at(login("ugie", "wrong"), now).await;
    }
    assert!(matches!(
        service
            .login_at(login("ugie", PASSWORD), now + Duration::minutes(9))
            .await,
        Err(AuthError::AccountLocked { remaining_minutes: 1 })
    ));

    // The lock field is still set, but it lies in the past.
    let later = now + Duration::minutes(10);
    let out = service.login_at(login("ugie", PASSWORD), later).await.unwrap();
    assert_eq!(out.user_id, user.id);
    let stored = users.get_by_id(user.id).await.unwrap();
    assert!(stored.account_locked_until.is_none());
    assert_eq!(stored.failed_login_attempts, 0);
}

#[tokio::test]
async fn expired_lock_grants_a_fresh_allowance() {
    let (service, users) = setup().await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(2)).await;
    set(&service, keys::ACCOUNT_LOCKOUT_DURATION, json!(10)).await;
    let user = member(&users).await;
    let now = Utc::now();

    for _ in 0..2 {
        let _ = service.login_at(login("ugie", "wrong"), now).await;
    }
    let later = now + Duration::minutes(11);
    let err = service
        .login_at(login("ugie", "wrong"), later)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let stored = users.get_by_id(user.id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 1);
    assert!(stored.account_locked_until.is_none());
}

#[tokio::test]
async fn admin_unlock_clears_the_lock() {
    let (service, users) = setup().await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(1)).await;
    let user = member(&users).await;

    let _ = service.login(login("ugie", "wrong")).await;
    assert!(matches!(
        service.login(login("ugie", PASSWORD)).await,
        Err(AuthError::AccountLocked { .. })
    ));

    service.unlock_account(user.id).await.unwrap();
    assert!(service.login(login("ugie", PASSWORD)).await.is_ok());
}

#[tokio::test]
async fn inactive_and_unverified_accounts() {
    let (service, users) = setup().await;
    users
        .create(CreateUser {
            username: "pending".into(),
            email: "pending@example.com".into(),
            password: PASSWORD.into(),
            role: UserRole::Member,
            status: UserStatus::PendingApproval,
        })
        .await
        .unwrap();
    assert!(matches!(
        service.login(login("pending", PASSWORD)).await,
        Err(AuthError::AccountInactive)
    ));

    member(&users).await;
    set(&service, keys::REQUIRE_EMAIL_VERIFICATION, json!(true)).await;
    assert!(matches!(
        service.login(login("ugie", PASSWORD)).await,
        Err(AuthError::EmailNotVerified)
    ));
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_expires_after_absolute_timeout() {
    let (service, users) = setup().await;
    set(&service, keys::SESSION_TIMEOUT, json!(1)).await;
    set(&service, keys::IDLE_TIMEOUT, json!(10_000)).await;
    member(&users).await;
    let now = Utc::now();

    let out = service.login_at(login("ugie", PASSWORD), now).await.unwrap();
    let err = service
        .validate_session_at(&out.session_token, now + Duration::hours(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::SessionExpired {
            reason: ExpiryReason::Absolute
        }
    ));
}

#[tokio::test]
async fn timeout_edits_apply_to_existing_sessions() {
    let (service, users) = setup().await;
    member(&users).await;
    let now = Utc::now();
    let out = service.login_at(login("ugie", PASSWORD), now).await.unwrap();
    let at = now + Duration::minutes(90);

    // Default idle timeout is 120 minutes.
    assert!(service.validate_session_at(&out.session_token, at).await.is_ok());

    set(&service, keys::IDLE_TIMEOUT, json!(60)).await;
    let err = service
        .validate_session_at(&out.session_token, at)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::SessionExpired {
            reason: ExpiryReason::Idle
        }
    ));
}

#[tokio::test]
async fn touching_a_session_slides_the_idle_window() {
    let (service, users) = setup().await;
    set(&service, keys::IDLE_TIMEOUT, json!(30)).await;
    member(&users).await;
    let now = Utc::now();
    let out = service.login_at(login("ugie", PASSWORD), now).await.unwrap();

    let touched = service
        .touch_session_at(&out.session_token, now + Duration::minutes(25))
        .await
        .unwrap();
    assert!(
        service
            .validate_session_at(&touched, now + Duration::minutes(50))
            .await
            .is_ok()
    );
    assert!(
        service
            .validate_session_at(&out.session_token, now + Duration::minutes(50))
            .await
            .is_err()
    );
}

// ---------------------------------------------------------------------------
// Two-factor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn site_flag_gates_two_factor_enforcement() {
    let (service, users) = setup().await;
    let user = member(&users).await;
    let now = Utc::now();
    enable_two_factor(&service, &user, now).await;

    // Site-wide flag off: password alone is enough.
    let out = service.login_at(login("ugie", PASSWORD), now).await.unwrap();
    assert!(out.two_factor_method.is_none());

    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    match service.login_at(login("ugie", PASSWORD), now).await {
        Err(AuthError::TwoFactorRequired {
            challenge_token,
            expires_in,
        }) => {
            assert_eq!(expires_in, 300);
            // The challenge is not a session.
            assert!(service.validate_session_at(&challenge_token, now).await.is_err());
        }
        other => panic!("expected TwoFactorRequired, got {other:?}"),
    }
}

#[tokio::test]
async fn two_factor_login_with_totp_and_backup_code() {
    let (service, users) = setup().await;
    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;

    let at = now + Duration::minutes(2);
    let challenge = challenge_at(&service, at).await;
    let code = code_at(&setup, &user.email, at);
    let out = service
        .complete_two_factor_at(&challenge, &code, at)
        .await
        .unwrap();
    assert_eq!(out.two_factor_method, Some(VerificationMethod::Totp));
    assert!(service.validate_session_at(&out.session_token, at).await.is_ok());

    let later = at + Duration::minutes(2);
    let challenge = challenge_at(&service, later).await;
    let backup = setup.backup_codes[0].clone();
    let out = service
        .complete_two_factor_at(&challenge, &backup, later)
        .await
        .unwrap();
    assert_eq!(out.two_factor_method, Some(VerificationMethod::Backup));
    assert_eq!(out.remaining_backup_codes, Some(setup.backup_codes.len() - 1));

    // Spent codes do not work twice.
    let again = later + Duration::minutes(1);
    let challenge = challenge_at(&service, again).await;
    let err = service
        .complete_two_factor_at(&challenge, &backup, again)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorInvalid));
}

#[tokio::test]
async fn challenge_and_totp_code_are_single_use() {
    let (service, users) = setup().await;
    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;

    let at = now + Duration::minutes(2);
    let challenge = challenge_at(&service, at).await;
    let code = code_at(&setup, &user.email, at);
    service
        .complete_two_factor_at(&challenge, &code, at)
        .await
        .unwrap();

    // The same challenge cannot mint a second session, even with a fresh code.
    let minute_later = at + Duration::minutes(1);
    let attempts = [
        (code.clone(), at),
        (code_at(&setup, &user.email, minute_later), minute_later),
    ];
    for (token, when) in attempts {
        let err = service
            .complete_two_factor_at(&challenge, &token, when)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)), "{err:?}");
    }

    // A new challenge does not revive the code already accepted.
    let soon = at + Duration::seconds(5);
    let fresh = challenge_at(&service, soon).await;
    let err = service
        .complete_two_factor_at(&fresh, &code, soon)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorInvalid));

    // The next code is fine.
    let next = at + Duration::minutes(2);
    let fresh = challenge_at(&service, next).await;
    let out = service
        .complete_two_factor_at(&fresh, &code_at(&setup, &user.email, next), next)
        .await
        .unwrap();
    assert_eq!(out.two_factor_method, Some(VerificationMethod::Totp));
}

#[tokio::test]
async fn the_enrolment_code_cannot_be_replayed_at_login() {
    let (service, users) = setup().await;
    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;

    let soon = now + Duration::seconds(5);
    let challenge = challenge_at(&service, soon).await;
    let err = service
        .complete_two_factor_at(&challenge, &code_at(&setup, &user.email, now), soon)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TwoFactorInvalid));
}

#[tokio::test]
async fn wrong_second_factors_lock_the_account() {
    let (service, users) = setup().await;
    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(3)).await;
    set(&service, keys::ACCOUNT_LOCKOUT_DURATION, json!(15)).await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;

    let at = now + Duration::minutes(2);
    let challenge = challenge_at(&service, at).await;
    for attempt in 1..=3 {
        let err = service
            .complete_two_factor_at(&challenge, "deadbeef", at)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorInvalid), "attempt {attempt}");
    }

    let stored = users.get_by_id(user.id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 3);
    assert!(stored.account_locked_until.is_some());

    // The right code is refused while locked, and so is the password.
    let code = code_at(&setup, &user.email, at);
    match service.complete_two_factor_at(&challenge, &code, at).await {
        Err(AuthError::AccountLocked { remaining_minutes }) => assert_eq!(remaining_minutes, 15),
        other => panic!("expected AccountLocked, got {other:?}"),
    }
    assert!(matches!(
        service.login_at(login("ugie", PASSWORD), at).await,
        Err(AuthError::AccountLocked { .. })
    ));
}

#[tokio::test]
async fn a_good_second_factor_clears_earlier_failures() {
    let (service, users) = setup().await;
    set(&service, keys::ENABLE_TWO_FACTOR_AUTH, json!(true)).await;
    set(&service, keys::LOGIN_ATTEMPT_LIMIT, json!(3)).await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;

    let at = now + Duration::minutes(2);
    let challenge = challenge_at(&service, at).await;
    for _ in 0..2 {
        let _ = service
            .complete_two_factor_at(&challenge, "deadbeef", at)
            .await;
    }
    assert_eq!(
        users.get_by_id(user.id).await.unwrap().failed_login_attempts,
        2
    );

    service
        .complete_two_factor_at(&challenge, &code_at(&setup, &user.email, at), at)
        .await
        .unwrap();
    let stored = users.get_by_id(user.id).await.unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.account_locked_until.is_none());
}

#[tokio::test]
async fn bad_tokens_fail_identically() {
    let (service, users) = setup().await;
    let user = member(&users).await;
    let now = Utc::now();
    enable_two_factor(&service, &user, now).await;
    let user = users.get_by_id(user.id).await.unwrap();

    for token in ["not-a-token", "000000", "deadbeef", ""] {
        let err = service
            .two_factor()
            .verify_at(&user, token, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TwoFactorInvalid), "token {token:?}");
    }
}

#[tokio::test]
async fn setup_persists_nothing_until_confirmed() {
    let (service, users) = setup().await;
    let user = member(&users).await;
    let now = Utc::now();

    let setup = service.two_factor().generate_setup(user.id).await.unwrap();
    assert_eq!(setup.backup_codes.len(), 10);
    assert!(setup.qr_payload.starts_with("otpauth://totp/"));
    assert!(!service.two_factor().status(user.id).await.unwrap().enabled);

    // Wrong confirmation code leaves 2FA off.
    let err = service
        .two_factor()
        .enable_at(user.id, PASSWORD, &setup, "000000", now)
        .await;
    assert!(err.is_err());
    let stored = users.get_by_id(user.id).await.unwrap();
    assert!(!stored.two_factor_enabled);
    assert!(stored.two_factor_secret.is_none());

    let code = code_at(&setup, &user.email, now);
    service
        .two_factor()
        .enable_at(user.id, PASSWORD, &setup, &code, now)
        .await
        .unwrap();
    let status = service.two_factor().status(user.id).await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.remaining_backup_codes, 10);

    // Secrets and codes are not stored in the clear.
    let stored = users.get_by_id(user.id).await.unwrap();
    assert_ne!(stored.two_factor_secret.as_deref(), Some(setup.secret.as_str()));
    assert!(!stored.two_factor_backup_codes.contains(&setup.backup_codes[0]));

    assert!(matches!(
        service.two_factor().generate_setup(user.id).await,
        Err(AuthError::TwoFactorAlreadyEnabled)
    ));
}

#[tokio::test]
async fn disable_and_regenerate_need_password_and_token() {
    let (service, users) = setup().await;
    let user = member(&users).await;
    let now = Utc::now();
    let setup = enable_two_factor(&service, &user, now).await;
    let at = now + Duration::minutes(2);
    let code = code_at(&setup, &user.email, at);

    assert!(matches!(
        service
            .two_factor()
            .disable_at(user.id, "wrong", &code, at)
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        service
            .two_factor()
            .disable_at(user.id, PASSWORD, "000000", at)
            .await,
        Err(AuthError::TwoFactorInvalid)
    ));

    let fresh = service
        .two_factor()
        .regenerate_backup_codes_at(user.id, PASSWORD, &code, at)
        .await
        .unwrap();
    assert_eq!(fresh.len(), 10);
    assert_ne!(fresh, setup.backup_codes);

    // The code just used cannot authorise a second operation.
    assert!(matches!(
        service
            .two_factor()
            .disable_at(user.id, PASSWORD, &code, at)
            .await,
        Err(AuthError::TwoFactorInvalid)
    ));

    // Old backup codes are gone, new ones work.
    let stored = users.get_by_id(user.id).await.unwrap();
    assert!(matches!(
        service
            .two_factor()
            .verify_at(&stored, &setup.backup_codes[1], at)
            .await,
        Err(AuthError::TwoFactorInvalid)
    ));

    service
        .two_factor()
        .disable_at(user.id, PASSWORD, &fresh[0], at)
        .await
        .unwrap();
    let status = service.two_factor().status(user.id).await.unwrap();
    assert!(!status.enabled);
    assert_eq!(status.remaining_backup_codes, 0);
}

// ---------------------------------------------------------------------------
// Registration and password changes
// ---------------------------------------------------------------------------

fn registration(password: &str) -> RegisterInput {
    RegisterInput {
        username: "balvenie".into(),
        email: "balvenie@example.com".into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn registration_enforces_the_password_policy() {
    let (service, _users) = setup().await;
    set(&service, keys::MIN_PASSWORD_LENGTH, json!(10)).await;

    match service.register(registration("Abc123!")).await {
        Err(AuthError::PasswordPolicy { errors }) => {
            assert!(errors.contains(&"Password must be at least 10 characters long".to_string()));
        }
        other => panic!("expected PasswordPolicy, got {other:?}"),
    }

    match service.register(registration("Balvenie-12-DoubleWood")).await {
        Err(AuthError::PasswordPolicy { errors }) => {
            assert_eq!(
                errors,
                vec!["Password must not contain your username or e-mail address".to_string()]
            );
        }
        other => panic!("expected PasswordPolicy, got {other:?}"),
    }

    let user = service.register(registration(PASSWORD)).await.unwrap();
    assert_eq!(user.role, UserRole::Member);
    assert_eq!(user.status, UserStatus::Active);
}

#[tokio::test]
async fn registration_follows_club_settings() {
    let (service, _users) = setup().await;

    set(&service, keys::REQUIRE_ADMIN_APPROVAL, json!(true)).await;
    let user = service.register(registration(PASSWORD)).await.unwrap();
    assert_eq!(user.status, UserStatus::PendingApproval);

    set(&service, keys::ALLOW_REGISTRATION, json!(false)).await;
    let err = service
        .register(RegisterInput {
            username: "oban".into(),
            email: "oban@example.com".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::RegistrationClosed));
}

#[tokio::test]
async fn change_password_rechecks_current_and_policy() {
    let (service, users) = setup().await;
    let user = member(&users).await;

    assert!(matches!(
        service
            .change_password(user.id, "wrong", "Talisker-Storm-10")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        service.change_password(user.id, PASSWORD, "short").await,
        Err(AuthError::PasswordPolicy { .. })
    ));

    service
        .change_password(user.id, PASSWORD, "Talisker-Storm-10")
        .await
        .unwrap();
    assert!(service.login(login("ugie", "Talisker-Storm-10")).await.is_ok());
    assert!(matches!(
        service.login(login("ugie", PASSWORD)).await,
        Err(AuthError::InvalidCredentials)
    ));
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limit_follows_setting() {
    let (service, _users) = setup().await;
    set(&service, keys::API_RATE_LIMIT, json!(2)).await;
    let limiter = RateLimiter::new(service.settings().clone(), 60);
    let key = RateLimitKey::Ip("10.0.0.1".parse().unwrap());
    let now = Utc::now();

    let first = limiter.check_at(&key, now).await.unwrap();
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, 1);
    limiter.check_at(&key, now).await.unwrap();

    match limiter.check_at(&key, now + Duration::seconds(10)).await {
        Err(AuthError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 50),
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // Other callers have their own window.
    let other = RateLimitKey::Ip("10.0.0.2".parse().unwrap());
    assert!(limiter.check_at(&other, now).await.is_ok());

    // The window resets.
    assert!(
        limiter
            .check_at(&key, now + Duration::seconds(60))
            .await
            .is_ok()
    );
    // The check at +60s already swept the other caller's ended window.
    assert_eq!(limiter.purge_expired(now + Duration::seconds(200)).await, 1);
}

#[tokio::test]
async fn ended_windows_are_swept_by_later_checks() {
    let (service, _users) = setup().await;
    let limiter = RateLimiter::new(service.settings().clone(), 60);
    let now = Utc::now();

    for last_octet in 1..=3 {
        let key = RateLimitKey::Ip(format!("10.0.0.{last_octet}").parse().unwrap());
        limiter.check_at(&key, now).await.unwrap();
    }

    // A check after the window length drops the three ended windows, so
    // nothing is left for an explicit purge.
    let later = now + Duration::seconds(90);
    let fresh = RateLimitKey::Ip("10.0.0.9".parse().unwrap());
    limiter.check_at(&fresh, later).await.unwrap();
    assert_eq!(limiter.purge_expired(later).await, 0);
    assert_eq!(limiter.purge_expired(later + Duration::seconds(60)).await, 1);
}

#[tokio::test]
async fn rate_limit_defaults_without_setting() {
    let (service, _users) = setup().await;
    let limiter = RateLimiter::new(service.settings().clone(), 900);
    let status = limiter
        .check_at(&RateLimitKey::Ip("127.0.0.1".parse().unwrap()), Utc::now())
        .await
        .unwrap();
    assert_eq!(status.limit, 100);
}

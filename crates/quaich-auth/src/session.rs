//! Session lifecycle: HS256 session tokens checked against the current
//! timeout settings, plus the short-lived two-factor challenge token.
//!
//! Session tokens carry no `exp` claim. The absolute and idle limits come
//! from the settings snapshot in force at validation time, so an admin
//! edit applies to tokens that were issued before it.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use quaich_core::models::user::{User, UserRole};
use quaich_settings::SecuritySettingsSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult, ExpiryReason};

/// Routes that never require a session. Prefix matches stop at a path
/// segment boundary.
pub const EXEMPT_ROUTES: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
    "/api/auth/verify-email",
    "/api/auth/2fa/verify-login",
    "/api/settings/public",
    "/api/health",
];

const CHALLENGE_PURPOSE: &str = "2fa_login";

/// Claims embedded in every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID (UUID string).
    pub sub: String,
    pub role: UserRole,
    pub iss: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Last observed activity (Unix seconds); absent when idle tracking
    /// is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<i64>,
    pub jti: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> AuthResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| AuthError::TokenInvalid(format!("bad subject: {e}")))
    }
}

/// Claims of the token returned with `TwoFactorRequired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChallengeClaims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
    purpose: String,
}

/// A challenge token that passed signature, purpose and expiry checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginChallenge {
    pub user_id: Uuid,
    /// Whole seconds, as carried in `iat`.
    pub issued_at: DateTime<Utc>,
}

/// A session that passed signature and timeout checks.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub user_id: Uuid,
    pub role: UserRole,
    pub claims: SessionClaims,
}

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    track_idle_activity: bool,
    challenge_lifetime: Duration,
}

impl SessionManager {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.jwt_issuer.clone(),
            track_idle_activity: config.track_idle_activity,
            challenge_lifetime: Duration::seconds(
                i64::try_from(config.two_factor_challenge_lifetime_secs).unwrap_or(i64::MAX / 2),
            ),
        }
    }

    pub fn challenge_lifetime_secs(&self) -> u64 {
        u64::try_from(self.challenge_lifetime.num_seconds()).unwrap_or(0)
    }

    pub fn issue(&self, user: &User) -> AuthResult<String> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> AuthResult<String> {
        let ts = now.timestamp();
        let claims = SessionClaims {
            sub: user.id.to_string(),
            role: user.role,
            iss: self.issuer.clone(),
            iat: ts,
            last_activity: self.track_idle_activity.then_some(ts),
            jti: Uuid::new_v4().to_string(),
        };
        self.encode(&claims)
    }

    pub fn validate(
        &self,
        token: &str,
        snapshot: &SecuritySettingsSnapshot,
    ) -> AuthResult<ValidatedSession> {
        self.validate_at(token, snapshot, Utc::now())
    }

    /// Decode `token` and apply the absolute and idle timeouts of
    /// `snapshot` as of `now`.
    pub fn validate_at(
        &self,
        token: &str,
        snapshot: &SecuritySettingsSnapshot,
        now: DateTime<Utc>,
    ) -> AuthResult<ValidatedSession> {
        let claims: SessionClaims = self.decode(token)?;
        let now = now.timestamp();

        let max_age = i64::from(snapshot.session_timeout_hours) * 3600;
        if now - claims.iat > max_age {
            return Err(AuthError::SessionExpired {
                reason: ExpiryReason::Absolute,
            });
        }

        if let Some(last_activity) = claims.last_activity {
            let max_idle = i64::from(snapshot.idle_timeout_minutes) * 60;
            if now - last_activity > max_idle {
                return Err(AuthError::SessionExpired {
                    reason: ExpiryReason::Idle,
                });
            }
        }

        Ok(ValidatedSession {
            user_id: claims.user_id()?,
            role: claims.role,
            claims,
        })
    }

    /// Re-issue a validated session with `last_activity = now`. The
    /// original `iat` is kept so the absolute limit still applies.
    pub fn touch_at(&self, session: &ValidatedSession, now: DateTime<Utc>) -> AuthResult<String> {
        if !self.track_idle_activity {
            return self.encode(&session.claims);
        }
        let claims = SessionClaims {
            last_activity: Some(now.timestamp()),
            ..session.claims.clone()
        };
        self.encode(&claims)
    }

    pub fn issue_challenge_at(&self, user_id: Uuid, now: DateTime<Utc>) -> AuthResult<String> {
        let claims = ChallengeClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + self.challenge_lifetime).timestamp(),
            purpose: CHALLENGE_PURPOSE.into(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    /// Check a challenge token and return who it was issued to, and when.
    /// Whether it was already spent is up to the caller.
    pub fn verify_challenge_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<LoginChallenge> {
        let claims: ChallengeClaims = self.decode(token)?;
        if claims.purpose != CHALLENGE_PURPOSE {
            return Err(AuthError::TokenInvalid("wrong token purpose".into()));
        }
        if now.timestamp() >= claims.exp {
            return Err(AuthError::TokenInvalid("challenge expired".into()));
        }
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| AuthError::TokenInvalid(format!("bad subject: {e}")))?;
        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| AuthError::TokenInvalid("bad issued-at".into()))?;
        Ok(LoginChallenge { user_id, issued_at })
    }

    fn encode(&self, claims: &SessionClaims) -> AuthResult<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> AuthResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "iss"]);
        validation.set_issuer(&[&self.issuer]);

        jsonwebtoken::decode::<T>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::TokenInvalid(e.to_string()))
    }
}

/// Whether `route` skips session validation entirely.
pub fn is_exempt(route: &str) -> bool {
    let path = route.split(['?', '#']).next().unwrap_or(route);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    EXEMPT_ROUTES.iter().any(|exempt| {
        path == *exempt
            || path
                .strip_prefix(exempt)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

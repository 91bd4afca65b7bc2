//! Quaich Auth: password policy, account lockout, session lifecycle,
//! two-factor verification and rate limiting, all driven by the
//! security settings in the settings store.

pub mod complexity;
pub mod config;
pub mod error;
pub mod lockout;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod totp;
pub mod two_factor;

pub use complexity::PasswordCheck;
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult, ExpiryReason};
pub use lockout::LockoutPolicy;
pub use rate_limit::{RateLimitKey, RateLimitStatus, RateLimiter};
pub use service::{AuthService, LoginInput, LoginOutput, RegisterInput};
pub use session::{LoginChallenge, SessionClaims, SessionManager, ValidatedSession, is_exempt};
pub use two_factor::{
    TwoFactorService, TwoFactorSetup, TwoFactorStatus, TwoFactorVerification, VerificationMethod,
};

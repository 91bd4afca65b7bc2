//! Static authentication configuration.
//!
//! Everything an administrator can tune at runtime (lockout limits,
//! timeouts, password rules, the 2FA switch) lives in the settings store
//! instead and is read through the security settings resolver.

use std::fmt;

/// Configuration for the authentication services.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 session and challenge tokens.
    pub jwt_secret: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id verification.
    /// Must match the pepper the user repository hashes with.
    pub pepper: Option<String>,
    /// 256-bit AES-GCM key for encrypting TOTP secrets at rest.
    /// `None` stores secrets base32-encoded.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Lifetime of the challenge token handed out when a login still
    /// needs its second factor (default: 300 = 5 minutes).
    pub two_factor_challenge_lifetime_secs: u64,
    /// Backup codes generated per setup or regeneration (default: 10).
    pub backup_code_count: usize,
    /// Embed a `last_activity` claim so idle timeouts apply.
    pub track_idle_activity: bool,
    /// Rate limiter window length (default: 900 = 15 minutes).
    pub rate_limit_window_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "quaich".into(),
            pepper: None,
            mfa_encryption_key: None,
            totp_issuer: "Quaich".into(),
            two_factor_challenge_lifetime_secs: 300,
            backup_code_count: 10,
            track_idle_activity: true,
            rate_limit_window_secs: 900,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("pepper", &self.pepper.as_ref().map(|_| "***"))
            .field("mfa_encryption_key", &self.mfa_encryption_key.map(|_| "***"))
            .field("totp_issuer", &self.totp_issuer)
            .field(
                "two_factor_challenge_lifetime_secs",
                &self.two_factor_challenge_lifetime_secs,
            )
            .field("backup_code_count", &self.backup_code_count)
            .field("track_idle_activity", &self.track_idle_activity)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .finish()
    }
}

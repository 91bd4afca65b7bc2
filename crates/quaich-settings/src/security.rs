//! Security settings resolution.
//!
//! Authentication code never reads security keys directly. It asks
//! [`SecuritySettingsResolver::resolve`] for a fresh
//! [`SecuritySettingsSnapshot`] per request; every field is populated,
//! falling back to the constants in [`crate::defaults`] for keys that
//! are missing, unreadable or malformed.

use std::collections::HashMap;

use quaich_core::models::setting::{DataType, Setting};
use quaich_core::repository::SettingRepository;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::defaults::{keys, password, security};
use crate::value::SettingValue;

/// Keys read by one resolution, in a single batch.
const SECURITY_KEYS: &[&str] = &[
    keys::LOGIN_ATTEMPT_LIMIT,
    keys::ACCOUNT_LOCKOUT_DURATION,
    keys::SESSION_TIMEOUT,
    keys::IDLE_TIMEOUT,
    keys::REQUIRE_EMAIL_VERIFICATION,
    keys::ENABLE_TWO_FACTOR_AUTH,
    keys::PASSWORD_COMPLEXITY_RULES,
    keys::MIN_PASSWORD_LENGTH,
];

/// Password complexity rule set. Missing fields take their defaults,
/// so a partial JSON object is still a usable rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordComplexityRules {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special_chars: bool,
    pub allowed_special_chars: String,
    pub prevent_common_passwords: bool,
    pub prevent_username_in_password: bool,
}

impl Default for PasswordComplexityRules {
    fn default() -> Self {
        Self {
            min_length: password::MIN_LENGTH,
            max_length: password::MAX_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: true,
            allowed_special_chars: password::ALLOWED_SPECIAL_CHARS.to_string(),
            prevent_common_passwords: true,
            prevent_username_in_password: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecuritySettingsSnapshot {
    pub login_attempt_limit: u32,
    pub account_lockout_duration_minutes: u32,
    pub session_timeout_hours: u32,
    pub idle_timeout_minutes: u32,
    pub require_email_verification: bool,
    pub enable_two_factor_auth: bool,
    /// `None` when the JSON rule set is absent or malformed.
    pub password_complexity_rules: Option<PasswordComplexityRules>,
    /// `min_password_length`, when configured; overrides the rule set's
    /// `min_length`.
    pub min_password_length: Option<usize>,
}

impl Default for SecuritySettingsSnapshot {
    fn default() -> Self {
        Self {
            login_attempt_limit: security::LOGIN_ATTEMPT_LIMIT,
            account_lockout_duration_minutes: security::ACCOUNT_LOCKOUT_DURATION_MINUTES,
            session_timeout_hours: security::SESSION_TIMEOUT_HOURS,
            idle_timeout_minutes: security::IDLE_TIMEOUT_MINUTES,
            require_email_verification: security::REQUIRE_EMAIL_VERIFICATION,
            enable_two_factor_auth: security::ENABLE_TWO_FACTOR_AUTH,
            password_complexity_rules: None,
            min_password_length: None,
        }
    }
}

impl SecuritySettingsSnapshot {
    /// Rule set to enforce: the configured rules (or the built-in
    /// defaults) with `min_password_length` applied on top.
    pub fn effective_password_rules(&self) -> PasswordComplexityRules {
        let mut rules = self.password_complexity_rules.clone().unwrap_or_default();
        if let Some(min) = self.min_password_length {
            rules.min_length = min;
        }
        rules
    }

    /// Build a snapshot from already-loaded settings. Pure; used by
    /// [`SecuritySettingsResolver::resolve`].
    pub fn from_settings(settings: &HashMap<String, Setting>) -> Self {
        let defaults = Self::default();
        Self {
            login_attempt_limit: positive(settings, keys::LOGIN_ATTEMPT_LIMIT)
                .unwrap_or(defaults.login_attempt_limit),
            account_lockout_duration_minutes: positive(settings, keys::ACCOUNT_LOCKOUT_DURATION)
                .unwrap_or(defaults.account_lockout_duration_minutes),
            session_timeout_hours: positive(settings, keys::SESSION_TIMEOUT)
                .unwrap_or(defaults.session_timeout_hours),
            idle_timeout_minutes: positive(settings, keys::IDLE_TIMEOUT)
                .unwrap_or(defaults.idle_timeout_minutes),
            require_email_verification: flag(settings, keys::REQUIRE_EMAIL_VERIFICATION)
                .unwrap_or(defaults.require_email_verification),
            enable_two_factor_auth: flag(settings, keys::ENABLE_TWO_FACTOR_AUTH)
                .unwrap_or(defaults.enable_two_factor_auth),
            password_complexity_rules: password_rules(settings),
            min_password_length: positive(settings, keys::MIN_PASSWORD_LENGTH)
                .map(|n| n as usize),
        }
    }
}

fn raw<'a>(settings: &'a HashMap<String, Setting>, key: &str) -> Option<&'a str> {
    settings.get(key).and_then(|s| s.value.as_deref())
}

fn positive(settings: &HashMap<String, Setting>, key: &str) -> Option<u32> {
    let raw = raw(settings, key)?;
    let parsed = SettingValue::decode(raw, DataType::Number)
        .ok()
        .and_then(|v| v.as_i64())
        .filter(|n| *n >= 1)
        .and_then(|n| u32::try_from(n).ok());
    if parsed.is_none() {
        warn!(key = %key, value = %raw, "Invalid security setting, using default");
    }
    parsed
}

fn flag(settings: &HashMap<String, Setting>, key: &str) -> Option<bool> {
    let raw = raw(settings, key)?;
    let parsed = SettingValue::decode(raw, DataType::Boolean)
        .ok()
        .and_then(|v| v.as_bool());
    if parsed.is_none() {
        warn!(key = %key, value = %raw, "Invalid security flag, using default");
    }
    parsed
}

fn password_rules(settings: &HashMap<String, Setting>) -> Option<PasswordComplexityRules> {
    let raw = raw(settings, keys::PASSWORD_COMPLEXITY_RULES)?;
    match serde_json::from_str::<PasswordComplexityRules>(raw) {
        Ok(rules) => Some(rules),
        Err(e) => {
            warn!(error = %e, "Malformed password_complexity_rules, ignoring");
            None
        }
    }
}

/// Reads the security keys from the store and folds them into a snapshot.
#[derive(Clone)]
pub struct SecuritySettingsResolver<R: SettingRepository> {
    repo: R,
}

impl<R: SettingRepository> SecuritySettingsResolver<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Resolve the current security snapshot. Never fails: a store
    /// error degrades to the built-in defaults.
    pub async fn resolve(&self) -> SecuritySettingsSnapshot {
        let settings = match self.repo.get_many(SECURITY_KEYS).await {
            Ok(rows) => rows
                .into_iter()
                .map(|s| (s.key.clone(), s))
                .collect::<HashMap<_, _>>(),
            Err(e) => {
                warn!(error = %e, "Failed to read security settings, using defaults");
                HashMap::new()
            }
        };

        let snapshot = SecuritySettingsSnapshot::from_settings(&settings);
        debug!(?snapshot, "Resolved security settings");
        snapshot
    }
}

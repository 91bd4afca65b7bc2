//! Password complexity engine.
//!
//! Every rule is checked and every violation reported, so a user sees all
//! problems with a candidate password at once.

use quaich_core::models::user::email_local_part;
use quaich_settings::PasswordComplexityRules;
use quaich_settings::defaults::password::COMMON_PASSWORDS;
use serde::Serialize;

/// Highest strength score.
pub const MAX_STRENGTH: u8 = 5;

/// Strength ceiling for a password that fails any rule.
pub const INVALID_STRENGTH_CAP: u8 = 2;

/// Identifiers shorter than this are not checked as substrings; a one- or
/// two-letter username would otherwise reject most passwords.
const MIN_IDENTIFIER_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// 0 (weakest) to 5.
    pub strength: u8,
}

/// Check `password` against `rules`, falling back to the built-in rule
/// set when none is configured.
pub fn validate(
    password: &str,
    rules: Option<&PasswordComplexityRules>,
    username: Option<&str>,
    email: Option<&str>,
) -> PasswordCheck {
    let defaults;
    let rules = match rules {
        Some(r) => r,
        None => {
            defaults = PasswordComplexityRules::default();
            &defaults
        }
    };

    let length = password.chars().count();
    let mut errors = Vec::new();

    if length < rules.min_length {
        errors.push(format!(
            "Password must be at least {} characters long",
            rules.min_length
        ));
    }
    if length > rules.max_length {
        errors.push(format!(
            "Password must be at most {} characters long",
            rules.max_length
        ));
    }
    if rules.require_uppercase && !password.chars().any(char::is_uppercase) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }
    if rules.require_lowercase && !password.chars().any(char::is_lowercase) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }
    if rules.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if rules.require_special_chars
        && !password
            .chars()
            .any(|c| rules.allowed_special_chars.contains(c))
    {
        errors.push(format!(
            "Password must contain at least one special character ({})",
            rules.allowed_special_chars
        ));
    }
    if rules.prevent_common_passwords && is_common(password) {
        errors.push("Password is too common".to_string());
    }
    if rules.prevent_username_in_password && contains_identity(password, username, email) {
        errors.push("Password must not contain your username or e-mail address".to_string());
    }

    let is_valid = errors.is_empty();
    let mut strength = strength(password);
    if !is_valid {
        strength = strength.min(INVALID_STRENGTH_CAP);
    }

    PasswordCheck {
        is_valid,
        errors,
        strength,
    }
}

/// Raw strength score, independent of any rule set.
///
/// +1 for length ≥ 8, +1 for length ≥ 12, +1 per character class present
/// (lowercase, uppercase, digit, symbol), +1 if length ≥ 16 and the score
/// is already at least 4. Capped at [`MAX_STRENGTH`].
pub fn strength(password: &str) -> u8 {
    let length = password.chars().count();
    let mut score: u8 = 0;

    if length >= 8 {
        score += 1;
    }
    if length >= 12 {
        score += 1;
    }
    if password.chars().any(char::is_lowercase) {
        score += 1;
    }
    if password.chars().any(char::is_uppercase) {
        score += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        score += 1;
    }
    if length >= 16 && score >= 4 {
        score += 1;
    }

    score.min(MAX_STRENGTH)
}

fn is_common(password: &str) -> bool {
    let lowered = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|common| *common == lowered)
}

fn contains_identity(password: &str, username: Option<&str>, email: Option<&str>) -> bool {
    let lowered = password.to_lowercase();
    let local_part = email.map(email_local_part);

    [username, local_part]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|id| id.chars().count() >= MIN_IDENTIFIER_LEN)
        .any(|id| lowered.contains(&id.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> PasswordComplexityRules {
        PasswordComplexityRules::default()
    }

    #[test]
    fn strong_password_passes() {
        let check = validate("Lagavulin#16yo", Some(&rules()), Some("alice"), None);
        assert!(check.is_valid, "{:?}", check.errors);
        assert!(check.errors.is_empty());
        assert_eq!(check.strength, 5);
    }

    #[test]
    fn short_password_with_raised_minimum() {
        let rules = PasswordComplexityRules {
            min_length: 10,
            ..rules()
        };
        let check = validate("Abc123!", Some(&rules), None, None);
        assert!(!check.is_valid);
        assert!(
            check
                .errors
                .contains(&"Password must be at least 10 characters long".to_string())
        );
        assert!(check.strength <= 2);
    }

    #[test]
    fn every_violation_is_reported() {
        // Too short, no uppercase, no digit, no special, contains username.
        let check = validate("alicex", Some(&rules()), Some("alice"), None);
        assert_eq!(check.errors.len(), 5, "{:?}", check.errors);
    }

    #[test]
    fn toggled_off_rules_are_skipped() {
        let rules = PasswordComplexityRules {
            require_uppercase: false,
            require_special_chars: false,
            require_numbers: false,
            ..rules()
        };
        let check = validate("longlowercase", Some(&rules), None, None);
        assert!(check.is_valid, "{:?}", check.errors);
    }

    #[test]
    fn special_chars_must_come_from_allowed_set() {
        let rules = PasswordComplexityRules {
            allowed_special_chars: "!".into(),
            ..rules()
        };
        let check = validate("Glenfarclas^105", Some(&rules), None, None);
        assert_eq!(check.errors.len(), 1);
        assert!(check.errors[0].starts_with("Password must contain at least one special"));
    }

    #[test]
    fn common_passwords_are_rejected_case_insensitively() {
        let rules = PasswordComplexityRules {
            min_length: 1,
            require_lowercase: false,
            require_numbers: false,
            require_special_chars: false,
            ..rules()
        };
        let check = validate("PASSWORD", Some(&rules), None, None);
        assert_eq!(check.errors, vec!["Password is too common".to_string()]);
    }

    #[test]
    fn email_local_part_is_checked() {
        let check = validate(
            "Xmacallan99!Y",
            Some(&rules()),
            Some("bob"),
            Some("Macallan@example.com"),
        );
        assert_eq!(
            check.errors,
            vec!["Password must not contain your username or e-mail address".to_string()]
        );
    }

    #[test]
    fn missing_rules_use_builtin_defaults() {
        let with_defaults = validate("short", None, None, None);
        let explicit = validate("short", Some(&rules()), None, None);
        assert_eq!(with_defaults, explicit);
    }

    #[test]
    fn strength_scoring() {
        assert_eq!(strength(""), 0);
        assert_eq!(strength("abcdefgh"), 2);
        assert_eq!(strength("abcdefghijkl"), 3);
        assert_eq!(strength("Abc123!"), 4);
        // 16+ characters with four classes hits the cap.
        assert_eq!(strength("Abcdefgh12345678!"), 5);
    }
}

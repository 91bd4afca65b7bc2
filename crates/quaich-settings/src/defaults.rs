//! Canonical setting keys, fallback defaults and the deployment seed list.
//!
//! Every consumer of a default (seed routine, security resolver,
//! password complexity engine) reads it from here.

use quaich_core::models::setting::{
    CreateSetting, DataType, EnumRule, PatternRule, ValidationRules,
};
use serde_json::{Value, json};

use crate::value::SettingValue;

pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const CONTACT_EMAIL: &str = "contact_email";
    pub const DEFAULT_TIMEZONE: &str = "default_timezone";
    pub const MAINTENANCE_MODE: &str = "maintenance_mode";
    pub const ALLOW_REGISTRATION: &str = "allow_registration";
    pub const REQUIRE_ADMIN_APPROVAL: &str = "require_admin_approval";

    pub const LOGIN_ATTEMPT_LIMIT: &str = "login_attempt_limit";
    pub const ACCOUNT_LOCKOUT_DURATION: &str = "account_lockout_duration";
    pub const SESSION_TIMEOUT: &str = "session_timeout";
    pub const IDLE_TIMEOUT: &str = "idle_timeout";
    pub const REQUIRE_EMAIL_VERIFICATION: &str = "require_email_verification";
    pub const ENABLE_TWO_FACTOR_AUTH: &str = "enable_two_factor_auth";
    pub const PASSWORD_COMPLEXITY_RULES: &str = "password_complexity_rules";
    pub const MIN_PASSWORD_LENGTH: &str = "min_password_length";
    pub const API_RATE_LIMIT: &str = "api_rate_limit";

    pub const EMAIL_FROM_ADDRESS: &str = "email_from_address";
    pub const EMAIL_NOTIFICATIONS: &str = "email_notifications_enabled";

    pub const SCHEMA_VERSION: &str = "schema_version";
}

/// Security fallbacks used whenever a setting is missing or unparseable.
pub mod security {
    pub const LOGIN_ATTEMPT_LIMIT: u32 = 5;
    pub const ACCOUNT_LOCKOUT_DURATION_MINUTES: u32 = 30;
    pub const SESSION_TIMEOUT_HOURS: u32 = 24;
    pub const IDLE_TIMEOUT_MINUTES: u32 = 120;
    pub const REQUIRE_EMAIL_VERIFICATION: bool = false;
    pub const ENABLE_TWO_FACTOR_AUTH: bool = false;
    pub const API_RATE_LIMIT: u32 = 100;
}

/// Password complexity fallbacks.
pub mod password {
    pub const MIN_LENGTH: usize = 8;
    pub const MAX_LENGTH: usize = 128;
    pub const ALLOWED_SPECIAL_CHARS: &str = "@$!%*?&#+-_.,~";

    /// Denylist checked when `prevent_common_passwords` is on. Compared
    /// case-insensitively against the whole password.
    pub const COMMON_PASSWORDS: &[&str] = &[
        "123456",
        "123456789",
        "12345678",
        "1234567890",
        "password",
        "password1",
        "password123",
        "passw0rd",
        "qwerty",
        "qwerty123",
        "abc123",
        "111111",
        "123123",
        "letmein",
        "welcome",
        "welcome1",
        "admin",
        "admin123",
        "iloveyou",
        "monkey",
        "dragon",
        "football",
        "baseball",
        "sunshine",
        "princess",
        "trustno1",
        "whisky",
        "whiskey",
        "whisky123",
        "scotch",
        "bourbon",
        "changeme",
    ];
}

/// Optional site features switched on and off by `enable_<feature>`.
pub const FEATURES: &[&str] = &[
    "ratings",
    "events",
    "tagging",
    "messaging",
    "following",
    "sharing",
    "webhooks",
    "exports",
];

pub fn feature_key(feature: &str) -> String {
    format!("enable_{feature}")
}

/// One entry of the seed list.
#[derive(Debug, Clone)]
pub struct SettingDefault {
    pub key: String,
    pub default_value: Value,
    pub data_type: DataType,
    pub category: &'static str,
    pub description: &'static str,
    pub is_public: bool,
    pub is_readonly: bool,
    pub validation_rules: Option<ValidationRules>,
}

impl SettingDefault {
    fn new(
        key: &str,
        default_value: Value,
        data_type: DataType,
        category: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            key: key.to_string(),
            default_value,
            data_type,
            category,
            description,
            is_public: false,
            is_readonly: false,
            validation_rules: None,
        }
    }

    fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    fn readonly(mut self) -> Self {
        self.is_readonly = true;
        self
    }

    fn rules(mut self, rules: ValidationRules) -> Self {
        self.validation_rules = Some(rules);
        self
    }

    pub fn to_create(&self) -> Result<CreateSetting, String> {
        Ok(CreateSetting {
            key: self.key.clone(),
            value: SettingValue::encode(&self.default_value, self.data_type)?,
            data_type: self.data_type,
            category: self.category.to_string(),
            description: Some(self.description.to_string()),
            is_public: self.is_public,
            is_readonly: self.is_readonly,
            validation_rules: self.validation_rules.clone(),
        })
    }
}

/// Default rule set, as stored under `password_complexity_rules`.
pub fn default_password_rules_json() -> Value {
    json!({
        "min_length": password::MIN_LENGTH,
        "max_length": password::MAX_LENGTH,
        "require_uppercase": true,
        "require_lowercase": true,
        "require_numbers": true,
        "require_special_chars": true,
        "allowed_special_chars": password::ALLOWED_SPECIAL_CHARS,
        "prevent_common_passwords": true,
        "prevent_username_in_password": true,
    })
}

/// The full seed list consumed by `SettingStore::initialize_defaults`.
pub fn default_settings() -> Vec<SettingDefault> {
    use DataType::{Array, Boolean, Json, Number};

    let mut seeds = vec![
        // -- general ------------------------------------------------------
        SettingDefault::new(
            keys::SITE_NAME,
            json!("Quaich Whisky Club"),
            DataType::String,
            "general",
            "Name displayed across the site",
        )
        .public()
        .rules(ValidationRules::with_length(1, 100)),
        SettingDefault::new(
            keys::SITE_DESCRIPTION,
            json!("A members' club for whisky enthusiasts"),
            DataType::String,
            "general",
            "Short description used in page headers",
        )
        .public()
        .rules(ValidationRules::with_length(0, 500)),
        SettingDefault::new(
            keys::CONTACT_EMAIL,
            json!("info@example.com"),
            DataType::String,
            "general",
            "Public contact address",
        )
        .public()
        .rules(ValidationRules {
            pattern: Some(PatternRule {
                value: r"^[^@\s]+@[^@\s]+\.[^@\s]+$".into(),
                message: Some("Contact email must be a valid email address".into()),
            }),
            ..Default::default()
        }),
        SettingDefault::new(
            keys::DEFAULT_TIMEZONE,
            json!("Europe/London"),
            DataType::String,
            "general",
            "Timezone used for event times",
        )
        .public(),
        SettingDefault::new(
            keys::MAINTENANCE_MODE,
            json!(false),
            Boolean,
            "general",
            "Reject non-admin traffic while enabled",
        )
        .public(),
        SettingDefault::new(
            keys::ALLOW_REGISTRATION,
            json!(true),
            Boolean,
            "general",
            "Whether new members can sign up",
        )
        .public(),
        SettingDefault::new(
            keys::REQUIRE_ADMIN_APPROVAL,
            json!(true),
            Boolean,
            "general",
            "New members wait for approval before they can sign in",
        ),
        // -- security -----------------------------------------------------
        SettingDefault::new(
            keys::LOGIN_ATTEMPT_LIMIT,
            json!(security::LOGIN_ATTEMPT_LIMIT),
            Number,
            "security",
            "Failed logins allowed before the account is locked",
        )
        .rules(ValidationRules::with_range(1.0, 20.0)),
        SettingDefault::new(
            keys::ACCOUNT_LOCKOUT_DURATION,
            json!(security::ACCOUNT_LOCKOUT_DURATION_MINUTES),
            Number,
            "security",
            "Lockout duration in minutes",
        )
        .rules(ValidationRules::with_range(1.0, 1440.0)),
        SettingDefault::new(
            keys::SESSION_TIMEOUT,
            json!(security::SESSION_TIMEOUT_HOURS),
            Number,
            "security",
            "Absolute session lifetime in hours",
        )
        .rules(ValidationRules::with_range(1.0, 720.0)),
        SettingDefault::new(
            keys::IDLE_TIMEOUT,
            json!(security::IDLE_TIMEOUT_MINUTES),
            Number,
            "security",
            "Inactivity timeout in minutes",
        )
        .rules(ValidationRules::with_range(5.0, 1440.0)),
        SettingDefault::new(
            keys::REQUIRE_EMAIL_VERIFICATION,
            json!(security::REQUIRE_EMAIL_VERIFICATION),
            Boolean,
            "security",
            "Block sign-in until the e-mail address is verified",
        ),
        SettingDefault::new(
            keys::ENABLE_TWO_FACTOR_AUTH,
            json!(security::ENABLE_TWO_FACTOR_AUTH),
            Boolean,
            "security",
            "Enforce two-factor authentication for members who enrolled",
        )
        .public(),
        SettingDefault::new(
            keys::PASSWORD_COMPLEXITY_RULES,
            default_password_rules_json(),
            Json,
            "security",
            "Password complexity rule set",
        ),
        SettingDefault::new(
            keys::MIN_PASSWORD_LENGTH,
            json!(password::MIN_LENGTH),
            Number,
            "security",
            "Minimum password length",
        )
        .public()
        .rules(ValidationRules::with_range(6.0, 128.0)),
        SettingDefault::new(
            keys::API_RATE_LIMIT,
            json!(security::API_RATE_LIMIT),
            Number,
            "security",
            "Requests allowed per client per rate-limit window",
        )
        .rules(ValidationRules::with_range(1.0, 100_000.0)),
        // -- email --------------------------------------------------------
        SettingDefault::new(
            keys::EMAIL_FROM_ADDRESS,
            json!("no-reply@example.com"),
            DataType::String,
            "email",
            "Sender address for outgoing mail",
        ),
        SettingDefault::new(
            keys::EMAIL_NOTIFICATIONS,
            json!(true),
            Boolean,
            "email",
            "Send notification e-mails to members",
        ),
        // -- system -------------------------------------------------------
        SettingDefault::new(
            keys::SCHEMA_VERSION,
            json!(1),
            Number,
            "system",
            "Settings schema version",
        )
        .readonly(),
        // -- features -----------------------------------------------------
        SettingDefault::new(
            "event_rsvp_mode",
            json!("open"),
            DataType::String,
            "features",
            "Who may RSVP to club events",
        )
        .public()
        .rules(ValidationRules {
            allowed: Some(EnumRule {
                values: vec![json!("open"), json!("members"), json!("invite")],
                message: None,
            }),
            ..Default::default()
        }),
        SettingDefault::new(
            "export_formats",
            json!(["csv", "json"]),
            Array,
            "features",
            "Formats offered by catalog export",
        ),
    ];

    seeds.extend(FEATURES.iter().map(|feature| {
        SettingDefault::new(
            &feature_key(feature),
            json!(true),
            Boolean,
            "features",
            "Feature toggle",
        )
        .public()
    }));

    seeds
}

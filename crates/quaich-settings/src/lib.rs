//! Quaich system settings: a typed key/value store with per-key
//! validation rules, the canonical defaults, and the security settings
//! resolver that feeds authentication.

pub mod defaults;
pub mod error;
pub mod security;
pub mod store;
pub mod validator;
pub mod value;

pub use error::{SettingsError, SettingsResult};
pub use security::{PasswordComplexityRules, SecuritySettingsResolver, SecuritySettingsSnapshot};
pub use store::{NewSetting, SetOptions, SettingStore, SettingView};
pub use validator::{ValidationOutcome, validate};
pub use value::SettingValue;

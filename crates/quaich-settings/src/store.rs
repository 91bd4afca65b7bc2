//! Setting Store service: typed reads, validated writes and the
//! deployment seed routine over a [`SettingRepository`].
//!
//! There is no cache in front of the repository. Every read goes to the
//! store, so a write is visible to the next reader.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use quaich_core::error::QuaichError;
use quaich_core::models::setting::{
    CreateSetting, DEFAULT_CATEGORY, DataType, Setting, ValidationRules,
};
use quaich_core::repository::SettingRepository;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::defaults::{self, SettingDefault};
use crate::error::{SettingsError, SettingsResult};
use crate::validator;
use crate::value::SettingValue;

/// Metadata used when [`SettingStore::set`] has to create the key.
/// Ignored when the key already exists.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Inferred from the JSON value when absent.
    pub data_type: Option<DataType>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_readonly: bool,
    pub validation_rules: Option<ValidationRules>,
}

/// Input for the admin create operation.
#[derive(Debug, Clone)]
pub struct NewSetting {
    pub key: String,
    pub value: Value,
    pub data_type: DataType,
    pub category: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_readonly: bool,
    pub validation_rules: Option<ValidationRules>,
}

/// A setting as returned to admin callers: metadata plus decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingView {
    pub key: String,
    pub value: Option<SettingValue>,
    pub data_type: DataType,
    pub category: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_rules: Option<ValidationRules>,
    pub updated_at: DateTime<Utc>,
}

impl From<Setting> for SettingView {
    fn from(s: Setting) -> Self {
        let value = decode(&s);
        Self {
            key: s.key,
            value,
            data_type: s.data_type,
            category: s.category,
            description: s.description,
            is_public: s.is_public,
            is_readonly: s.is_readonly,
            validation_rules: s.validation_rules,
            updated_at: s.updated_at,
        }
    }
}

/// Key → typed value for one category. `None` marks a stored null.
pub type CategoryMap = BTreeMap<String, Option<SettingValue>>;

fn decode(setting: &Setting) -> Option<SettingValue> {
    setting
        .value
        .as_deref()
        .map(|raw| SettingValue::decode_lossy(&setting.key, raw, setting.data_type))
}

fn infer_data_type(value: &Value) -> DataType {
    match value {
        Value::Bool(_) => DataType::Boolean,
        Value::Number(_) => DataType::Number,
        Value::Array(_) => DataType::Array,
        Value::Object(_) => DataType::Json,
        Value::String(_) | Value::Null => DataType::String,
    }
}

#[derive(Clone)]
pub struct SettingStore<R: SettingRepository> {
    repo: R,
}

impl<R: SettingRepository> SettingStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    async fn load(&self, key: &str) -> SettingsResult<Setting> {
        match self.repo.get_by_key(key).await {
            Ok(setting) => Ok(setting),
            Err(QuaichError::NotFound { .. }) => Err(SettingsError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, key: &str) -> SettingsResult<Option<Setting>> {
        match self.load(key).await {
            Ok(setting) => Ok(Some(setting)),
            Err(SettingsError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Typed value for `key`, or `None` when the key is absent or holds
    /// a null. A value that does not parse as its data type comes back
    /// as the raw string.
    pub async fn get(&self, key: &str) -> SettingsResult<Option<SettingValue>> {
        let value = self.find(key).await?.as_ref().and_then(decode);
        debug!(key = %key, found = value.is_some(), "Read setting");
        Ok(value)
    }

    pub async fn get_or(&self, key: &str, default: SettingValue) -> SettingsResult<SettingValue> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Full record for admin reads.
    pub async fn get_setting(&self, key: &str) -> SettingsResult<SettingView> {
        self.load(key).await.map(SettingView::from)
    }

    /// Upsert. An existing key keeps its metadata and only its value
    /// changes; a missing key is created from `options`.
    pub async fn set(
        &self,
        key: &str,
        value: &Value,
        options: SetOptions,
    ) -> SettingsResult<SettingView> {
        if self.find(key).await?.is_some() {
            return self.update(key, value).await;
        }

        let data_type = options.data_type.unwrap_or_else(|| infer_data_type(value));
        let created = self
            .create(NewSetting {
                key: key.to_string(),
                value: value.clone(),
                data_type,
                category: options.category,
                description: options.description,
                is_public: options.is_public,
                is_readonly: options.is_readonly,
                validation_rules: options.validation_rules,
            })
            .await;

        match created {
            // Lost a race with a concurrent creator; fall back to updating.
            Err(SettingsError::AlreadyExists { .. }) => self.update(key, value).await,
            other => other,
        }
    }

    /// Admin create. Rejects existing keys; the initial value must pass
    /// the supplied rules.
    pub async fn create(&self, input: NewSetting) -> SettingsResult<SettingView> {
        let value = prepare(
            &input.key,
            &input.value,
            input.validation_rules.as_ref(),
            input.data_type,
        )?;

        let created = self
            .repo
            .create(CreateSetting {
                key: input.key.clone(),
                value,
                data_type: input.data_type,
                category: input
                    .category
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                description: input.description,
                is_public: input.is_public,
                is_readonly: input.is_readonly,
                validation_rules: input.validation_rules.filter(|r| !r.is_empty()),
            })
            .await
            .map_err(|e| match e {
                QuaichError::AlreadyExists { .. } => SettingsError::AlreadyExists {
                    key: input.key.clone(),
                },
                other => other.into(),
            })?;

        info!(key = %created.key, category = %created.category, "Setting created");
        Ok(created.into())
    }

    /// The validated update path: readonly check, serialization, rule
    /// validation, persist. Nothing is written unless all pass.
    pub async fn update(&self, key: &str, value: &Value) -> SettingsResult<SettingView> {
        let existing = self.load(key).await?;
        if existing.is_readonly {
            warn!(key = %key, "Rejected write to read-only setting");
            return Err(SettingsError::ReadonlyViolation {
                key: key.to_string(),
            });
        }

        let serialized = prepare(
            key,
            value,
            existing.validation_rules.as_ref(),
            existing.data_type,
        )?;

        let updated = self.repo.update_value(key, serialized).await?;
        info!(key = %key, "Setting updated");
        Ok(updated.into())
    }

    /// Permanently remove a setting. Read-only settings cannot be deleted.
    pub async fn delete(&self, key: &str) -> SettingsResult<()> {
        let existing = self.load(key).await?;
        if existing.is_readonly {
            warn!(key = %key, "Rejected delete of read-only setting");
            return Err(SettingsError::ReadonlyViolation {
                key: key.to_string(),
            });
        }
        self.repo.delete(key).await?;
        info!(key = %key, "Setting deleted");
        Ok(())
    }

    pub async fn list_by_category(
        &self,
        category: &str,
        include_private: bool,
    ) -> SettingsResult<CategoryMap> {
        let settings = self.repo.list_by_category(category).await?;
        Ok(settings
            .iter()
            .filter(|s| include_private || s.is_public)
            .map(|s| (s.key.clone(), decode(s)))
            .collect())
    }

    /// Every visible setting, grouped by category.
    pub async fn list_all(
        &self,
        include_private: bool,
    ) -> SettingsResult<BTreeMap<String, CategoryMap>> {
        let settings = self.repo.list().await?;
        let mut grouped: BTreeMap<String, CategoryMap> = BTreeMap::new();
        for s in settings.iter().filter(|s| include_private || s.is_public) {
            grouped
                .entry(s.category.clone())
                .or_default()
                .insert(s.key.clone(), decode(s));
        }
        Ok(grouped)
    }

    /// Seed the default settings. Only missing keys are inserted, so
    /// values edited by an administrator survive a re-run. Returns the
    /// number of keys inserted.
    pub async fn initialize_defaults(&self) -> SettingsResult<usize> {
        self.seed(&defaults::default_settings()).await
    }

    async fn seed(&self, seeds: &[SettingDefault]) -> SettingsResult<usize> {
        let keys: Vec<&str> = seeds.iter().map(|s| s.key.as_str()).collect();
        let existing: HashSet<String> = self
            .repo
            .get_many(&keys)
            .await?
            .into_iter()
            .map(|s| s.key)
            .collect();

        let mut inserted = 0;
        for seed in seeds.iter().filter(|s| !existing.contains(&s.key)) {
            let input = seed.to_create().map_err(|message| SettingsError::Serialization {
                key: seed.key.clone(),
                data_type: seed.data_type,
                message,
            })?;
            match self.repo.create(input).await {
                Ok(_) => inserted += 1,
                Err(QuaichError::AlreadyExists { .. }) => {
                    debug!(key = %seed.key, "Default already present, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            inserted,
            total = seeds.len(),
            "Default settings initialized"
        );
        Ok(inserted)
    }

    /// On/off contract for optional features: the boolean
    /// `enable_<feature>` setting, `false` when absent or unreadable.
    pub async fn feature_enabled(&self, feature: &str) -> bool {
        let key = defaults::feature_key(feature);
        match self.get(&key).await {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read feature flag, treating as disabled");
                false
            }
        }
    }
}

/// Serialize `value` for `data_type`, then validate the coerced value
/// (so `"15"` for a number setting is checked as `15`).
fn prepare(
    key: &str,
    value: &Value,
    rules: Option<&ValidationRules>,
    data_type: DataType,
) -> SettingsResult<Option<String>> {
    let serialized = serialize(key, value, data_type)?;
    let coerced = match serialized.as_deref() {
        Some(raw) => SettingValue::decode(raw, data_type)
            .map(SettingValue::into_json)
            .unwrap_or_else(|_| value.clone()),
        None => Value::Null,
    };
    check(key, &coerced, rules, data_type)?;
    Ok(serialized)
}

fn check(
    key: &str,
    value: &Value,
    rules: Option<&ValidationRules>,
    data_type: DataType,
) -> SettingsResult<()> {
    let outcome = validator::validate(value, rules, data_type);
    if outcome.valid {
        return Ok(());
    }
    let message = outcome
        .message
        .unwrap_or_else(|| "Invalid value".to_string());
    debug!(key = %key, message = %message, "Setting value rejected");
    Err(SettingsError::Validation {
        key: key.to_string(),
        message,
    })
}

fn serialize(key: &str, value: &Value, data_type: DataType) -> SettingsResult<Option<String>> {
    SettingValue::encode(value, data_type).map_err(|message| SettingsError::Serialization {
        key: key.to_string(),
        data_type,
        message,
    })
}

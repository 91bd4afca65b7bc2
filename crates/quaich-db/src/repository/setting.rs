//! SurrealDB implementation of [`SettingRepository`].
//!
//! The record id is the setting key, so `type::record('setting', $key)`
//! addresses a setting directly and duplicate keys are impossible.
//! Validation rules are stored as a JSON string.

use chrono::{DateTime, Utc};
use quaich_core::error::QuaichResult;
use quaich_core::models::setting::{CreateSetting, DataType, Setting, ValidationRules};
use quaich_core::repository::SettingRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::warn;

use crate::error::DbError;

const ENTITY: &str = "setting";

#[derive(Debug, SurrealValue)]
struct SettingRow {
    key: String,
    value: Option<String>,
    data_type: String,
    category: String,
    description: Option<String>,
    is_public: bool,
    is_readonly: bool,
    validation_rules: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SettingRow {
    fn try_into_setting(self) -> Result<Setting, DbError> {
        let data_type = self
            .data_type
            .parse::<DataType>()
            .map_err(|message| DbError::Corrupt {
                entity: ENTITY.into(),
                message,
            })?;

        // Unreadable rules must not make the setting itself unreadable.
        let validation_rules = self.validation_rules.as_deref().and_then(|raw| {
            serde_json::from_str::<ValidationRules>(raw)
                .inspect_err(|e| {
                    warn!(key = %self.key, error = %e, "Ignoring malformed validation rules");
                })
                .ok()
        });

        Ok(Setting {
            key: self.key,
            value: self.value,
            data_type,
            category: self.category,
            description: self.description,
            is_public: self.is_public,
            is_readonly: self.is_readonly,
            validation_rules,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_settings(rows: Vec<SettingRow>) -> Result<Vec<Setting>, DbError> {
    rows.into_iter().map(SettingRow::try_into_setting).collect()
}

fn encode_rules(rules: Option<&ValidationRules>) -> Result<Option<String>, DbError> {
    rules
        .filter(|r| !r.is_empty())
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DbError::Corrupt {
            entity: ENTITY.into(),
            message: e.to_string(),
        })
}

#[derive(Clone)]
pub struct SurrealSettingRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSettingRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SettingRepository for SurrealSettingRepository<C> {
    async fn create(&self, input: CreateSetting) -> QuaichResult<Setting> {
        let rules = encode_rules(input.validation_rules.as_ref())?;

        let result = self
            .db
            .query(
                "CREATE type::record('setting', $key) SET \
                 key = $key, value = $value, data_type = $data_type, \
                 category = $category, description = $description, \
                 is_public = $is_public, is_readonly = $is_readonly, \
                 validation_rules = $validation_rules",
            )
            .bind(("key", input.key.clone()))
            .bind(("value", input.value))
            .bind(("data_type", input.data_type.as_str().to_string()))
            .bind(("category", input.category))
            .bind(("description", input.description))
            .bind(("is_public", input.is_public))
            .bind(("is_readonly", input.is_readonly))
            .bind(("validation_rules", rules))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_check(ENTITY, e))?;

        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: input.key,
        })?;

        Ok(row.try_into_setting()?)
    }

    async fn get_by_key(&self, key: &str) -> QuaichResult<Setting> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('setting', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: key.to_string(),
        })?;

        Ok(row.try_into_setting()?)
    }

    async fn get_many(&self, keys: &[&str]) -> QuaichResult<Vec<Setting>> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        let mut result = self
            .db
            .query("SELECT * FROM setting WHERE key IN $keys")
            .bind(("keys", keys))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_settings(rows)?)
    }

    async fn update_value(&self, key: &str, value: Option<String>) -> QuaichResult<Setting> {
        let result = self
            .db
            .query(
                "UPDATE type::record('setting', $key) SET \
                 value = $value, updated_at = time::now()",
            )
            .bind(("key", key.to_string()))
            .bind(("value", value))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        // UPDATE on a missing record id returns no rows.
        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY.into(),
            id: key.to_string(),
        })?;

        Ok(row.try_into_setting()?)
    }

    async fn list_by_category(&self, category: &str) -> QuaichResult<Vec<Setting>> {
        let mut result = self
            .db
            .query("SELECT * FROM setting WHERE category = $category ORDER BY key ASC")
            .bind(("category", category.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_settings(rows)?)
    }

    async fn list(&self) -> QuaichResult<Vec<Setting>> {
        let mut result = self
            .db
            .query("SELECT * FROM setting ORDER BY category ASC, key ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SettingRow> = result.take(0).map_err(DbError::from)?;
        Ok(into_settings(rows)?)
    }

    async fn delete(&self, key: &str) -> QuaichResult<()> {
        self.db
            .query("DELETE type::record('setting', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }
}

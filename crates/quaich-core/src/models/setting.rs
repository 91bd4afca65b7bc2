//! System setting domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned to settings created without an explicit one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Declared type of a setting's value. The value itself is always
/// persisted as a string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Json,
    Array,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Json => "json",
            DataType::Array => "array",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(DataType::String),
            "number" => Ok(DataType::Number),
            "boolean" => Ok(DataType::Boolean),
            "json" => Ok(DataType::Json),
            "array" => Ok(DataType::Array),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// Allowed-values rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnumRule {
    pub values: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Numeric bound (`min` / `max`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NumericBound {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// String length bound (`minLength` / `maxLength`), counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LengthBound {
    pub value: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Regular-expression rule for string settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRule {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-key validation rules embedded on a [`Setting`].
///
/// Numeric bounds only apply to `number` settings; length and pattern
/// rules only apply to `string` settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<EnumRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<NumericBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<NumericBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<LengthBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<LengthBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternRule>,
}

impl ValidationRules {
    pub fn is_empty(&self) -> bool {
        self.allowed.is_none()
            && self.min.is_none()
            && self.max.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.pattern.is_none()
    }

    pub fn with_range(min: f64, max: f64) -> Self {
        Self {
            min: Some(NumericBound {
                value: min,
                message: None,
            }),
            max: Some(NumericBound {
                value: max,
                message: None,
            }),
            ..Default::default()
        }
    }

    pub fn with_length(min: usize, max: usize) -> Self {
        Self {
            min_length: Some(LengthBound {
                value: min,
                message: None,
            }),
            max_length: Some(LengthBound {
                value: max,
                message: None,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setting {
    pub key: String,
    /// Serialized value; `None` for settings created without one.
    pub value: Option<String>,
    pub data_type: DataType,
    pub category: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_readonly: bool,
    pub validation_rules: Option<ValidationRules>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateSetting {
    pub key: String,
    pub value: Option<String>,
    pub data_type: DataType,
    pub category: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_readonly: bool,
    pub validation_rules: Option<ValidationRules>,
}

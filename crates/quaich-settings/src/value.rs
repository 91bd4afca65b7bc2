//! Typed setting values and the string codec behind them.
//!
//! Settings are stored as strings tagged with a [`DataType`]. Decoding
//! is total at the store boundary: a value that does not parse as its
//! declared type is handed back as [`SettingValue::String`] with the raw
//! text, never as an error.

use quaich_core::models::setting::DataType;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    Number(Number),
    Bool(bool),
    Json(Value),
    Array(Vec<Value>),
}

impl SettingValue {
    /// Strictly decode `raw` according to `data_type`.
    pub fn decode(raw: &str, data_type: DataType) -> Result<Self, String> {
        match data_type {
            DataType::String => Ok(SettingValue::String(raw.to_string())),
            DataType::Number => parse_number(raw).map(SettingValue::Number),
            DataType::Boolean => parse_bool(raw).map(SettingValue::Bool),
            DataType::Json => serde_json::from_str(raw)
                .map(SettingValue::Json)
                .map_err(|e| format!("invalid JSON: {e}")),
            DataType::Array => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => Ok(SettingValue::Array(items)),
                Ok(_) => Err("value is not a JSON array".into()),
                Err(e) => Err(format!("invalid JSON array: {e}")),
            },
        }
    }

    /// Decode `raw`, falling back to the raw string when it does not
    /// match `data_type`.
    pub fn decode_lossy(key: &str, raw: &str, data_type: DataType) -> Self {
        match Self::decode(raw, data_type) {
            Ok(value) => value,
            Err(reason) => {
                warn!(
                    key = %key,
                    data_type = %data_type,
                    reason = %reason,
                    "Setting value does not match its data type, returning raw string"
                );
                SettingValue::String(raw.to_string())
            }
        }
    }

    /// Serialize a JSON input into the stored string form for
    /// `data_type`. `Null` serializes to `None`.
    pub fn encode(value: &Value, data_type: DataType) -> Result<Option<String>, String> {
        if value.is_null() {
            return Ok(None);
        }
        let encoded = match data_type {
            DataType::String => match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err("expected a string".into()),
            },
            DataType::Number => match value {
                Value::Number(n) => n.to_string(),
                Value::String(s) => parse_number(s)?.to_string(),
                _ => return Err(format!("{value} is not a number")),
            },
            DataType::Boolean => match value {
                Value::Bool(b) => b.to_string(),
                Value::String(s) => parse_bool(s)?.to_string(),
                _ => return Err(format!("{value} is not a boolean")),
            },
            DataType::Json => serde_json::to_string(value).map_err(|e| e.to_string())?,
            DataType::Array => match value {
                Value::Array(_) => serde_json::to_string(value).map_err(|e| e.to_string())?,
                Value::String(s) => match serde_json::from_str::<Value>(s) {
                    Ok(parsed @ Value::Array(_)) => parsed.to_string(),
                    _ => return Err("expected a JSON array".into()),
                },
                _ => return Err("expected a JSON array".into()),
            },
        };
        Ok(Some(encoded))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::String(s) => parse_bool(s).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            SettingValue::String(s) => parse_number(s).ok().and_then(|n| n.as_i64()),
            _ => None,
        }
    }


    pub fn into_json(self) -> Value {
        match self {
            SettingValue::String(s) => Value::String(s),
            SettingValue::Number(n) => Value::Number(n),
            SettingValue::Bool(b) => Value::Bool(b),
            SettingValue::Json(v) => v,
            SettingValue::Array(items) => Value::Array(items),
        }
    }
}

fn parse_number(raw: &str) -> Result<Number, String> {
    raw.trim()
        .parse::<Number>()
        .map_err(|_| format!("{raw:?} is not a number"))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(format!("{raw:?} is not a boolean"))
    }
}

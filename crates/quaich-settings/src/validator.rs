//! Rule-driven validation of candidate setting values.
//!
//! Checks run in a fixed order and stop at the first failure:
//! type → enum → numeric range → string length → pattern.

use quaich_core::models::setting::{DataType, ValidationRules};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Validate `value` against its declared type and optional rules.
///
/// `Null` is always accepted: it clears the setting and no rule applies
/// to an absent value.
pub fn validate(
    value: &Value,
    rules: Option<&ValidationRules>,
    data_type: DataType,
) -> ValidationOutcome {
    if value.is_null() {
        return ValidationOutcome::ok();
    }

    if let Some(message) = type_mismatch(value, data_type) {
        return ValidationOutcome::fail(message);
    }

    let Some(rules) = rules else {
        return ValidationOutcome::ok();
    };

    if let Some(rule) = &rules.allowed {
        if !rule.values.iter().any(|allowed| values_equal(allowed, value)) {
            let listed = rule
                .values
                .iter()
                .map(display_value)
                .collect::<Vec<_>>()
                .join(", ");
            return ValidationOutcome::fail(
                rule.message
                    .clone()
                    .unwrap_or_else(|| format!("Value must be one of: {listed}")),
            );
        }
    }

    if data_type == DataType::Number {
        // Type check above guarantees a finite number.
        let n = value.as_f64().unwrap_or_default();
        if let Some(min) = &rules.min {
            if n < min.value {
                return ValidationOutcome::fail(
                    min.message
                        .clone()
                        .unwrap_or_else(|| format!("Value must be at least {}", min.value)),
                );
            }
        }
        if let Some(max) = &rules.max {
            if n > max.value {
                return ValidationOutcome::fail(
                    max.message
                        .clone()
                        .unwrap_or_else(|| format!("Value must be at most {}", max.value)),
                );
            }
        }
    }

    if data_type == DataType::String {
        let s = value.as_str().unwrap_or_default();
        let len = s.chars().count();
        if let Some(min) = &rules.min_length {
            if len < min.value {
                return ValidationOutcome::fail(min.message.clone().unwrap_or_else(|| {
                    format!("Value must be at least {} characters long", min.value)
                }));
            }
        }
        if let Some(max) = &rules.max_length {
            if len > max.value {
                return ValidationOutcome::fail(max.message.clone().unwrap_or_else(|| {
                    format!("Value must be at most {} characters long", max.value)
                }));
            }
        }
        if let Some(pattern) = &rules.pattern {
            match Regex::new(&pattern.value) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => {
                    return ValidationOutcome::fail(
                        pattern
                            .message
                            .clone()
                            .unwrap_or_else(|| "Value does not match the required format".into()),
                    );
                }
                Err(_) => return ValidationOutcome::fail("Validation pattern is invalid"),
            }
        }
    }

    ValidationOutcome::ok()
}

fn type_mismatch(value: &Value, data_type: DataType) -> Option<&'static str> {
    match data_type {
        DataType::Boolean if !value.is_boolean() => Some("Value must be a boolean"),
        DataType::Number if !value.as_f64().is_some_and(f64::is_finite) => {
            Some("Value must be a number")
        }
        DataType::String if !value.is_string() => Some("Value must be a string"),
        DataType::Array if !value.is_array() => Some("Value must be an array"),
        _ => None,
    }
}

fn values_equal(allowed: &Value, candidate: &Value) -> bool {
    match (allowed.as_f64(), candidate.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => allowed == candidate,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

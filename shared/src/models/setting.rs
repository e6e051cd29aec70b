//! Typed Settings
//!
//! 运行时可改的配置项：TEXT 存储 + 显式类型判别，
//! 每个变体有独立的 parse/serialize，不做运行时类型猜测。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub updated_at: i64,
}

#[derive(Debug, Error)]
pub enum SettingParseError {
    #[error("unknown setting type: {0}")]
    UnknownType(String),

    #[error("invalid {expected} value for setting: {raw}")]
    InvalidValue { expected: &'static str, raw: String },
}

/// Typed setting value — tagged union over the supported storage types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Json(serde_json::Value),
}

impl SettingValue {
    /// The discriminant stored in the `value_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "string",
            SettingValue::Number(_) => "number",
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Json(_) => "json",
        }
    }

    /// Parse a raw (value, value_type) pair from storage.
    pub fn parse(value_type: &str, raw: &str) -> Result<SettingValue, SettingParseError> {
        match value_type {
            "string" => Ok(SettingValue::String(raw.to_string())),
            "number" => raw
                .parse::<f64>()
                .map(SettingValue::Number)
                .map_err(|_| SettingParseError::InvalidValue {
                    expected: "number",
                    raw: raw.to_string(),
                }),
            "boolean" => match raw {
                "true" | "1" => Ok(SettingValue::Boolean(true)),
                "false" | "0" => Ok(SettingValue::Boolean(false)),
                _ => Err(SettingParseError::InvalidValue {
                    expected: "boolean",
                    raw: raw.to_string(),
                }),
            },
            "json" => serde_json::from_str(raw)
                .map(SettingValue::Json)
                .map_err(|_| SettingParseError::InvalidValue {
                    expected: "json",
                    raw: raw.to_string(),
                }),
            other => Err(SettingParseError::UnknownType(other.to_string())),
        }
    }

    /// Serialize back to the storage representation.
    pub fn to_storage(&self) -> (&'static str, String) {
        let raw = match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Number(n) => n.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Json(v) => v.to_string(),
        };
        (self.type_name(), raw)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }
}

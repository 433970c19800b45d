//! The backend's `{ success, message, data, errors }` response wrapper.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Value>,
}

fn default_success() -> bool {
    true
}

impl<T: DeserializeOwned> Envelope<T> {
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// The payload, or a decode error naming what was missing.
    pub fn into_data(self) -> Result<T, ApiError> {
        self.data
            .ok_or_else(|| ApiError::Decode("response envelope has no data".into()))
    }
}

/// Best human-readable message in an error body.
///
/// Prefers the envelope `message`, then the first string found in `errors`,
/// then a bare `detail` field. Returns `None` for non-JSON bodies.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty());
    if let Some(m) = message {
        return Some(m.to_string());
    }
    if let Some(m) = value.get("errors").and_then(first_string) {
        return Some(m);
    }
    value
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        Value::Object(fields) => fields.values().find_map(first_string),
        _ => None,
    }
}

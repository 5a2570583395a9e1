use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;

/// Backend response wrapper; `code == 0` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 0, message: None, data: Some(data) }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()), data: None }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    fn domain_error(code: i64, message: Option<String>) -> ApiError {
        ApiError::Domain {
            code,
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "request rejected".to_string()),
        }
    }

    /// Success payload; a successful envelope without `data` is a decode error.
    pub fn into_data(self) -> Result<T, ApiError> {
        if self.code != 0 {
            return Err(Self::domain_error(self.code, self.message));
        }
        self.data
            .ok_or_else(|| ApiError::Decode("success envelope without data".to_string()))
    }

    /// For operations whose payload the caller does not need.
    pub fn into_unit(self) -> Result<(), ApiError> {
        if self.code != 0 {
            return Err(Self::domain_error(self.code, self.message));
        }
        Ok(())
    }
}

/// Rejects a raw envelope whose `code` is non-zero. Used before caching so
/// domain failures never populate an entry.
pub fn check_envelope(value: &Value) -> Result<(), ApiError> {
    let code = match value.get("code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
        Some(_) => -1,
        None => return Err(ApiError::Decode("response has no code field".to_string())),
    };
    if code == 0 {
        return Ok(());
    }
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    Err(ApiResponse::<Value>::domain_error(code, message))
}

pub fn decode<T: DeserializeOwned>(value: Value) -> Result<ApiResponse<T>, ApiError> {
    Ok(serde_json::from_value(value)?)
}

//! Uniform response envelope.

use crate::{ApiError, ApiResult};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use topup_types::PaginationMeta;

/// Client-side failure codes. Any other code comes from the server.
pub mod codes {
    /// Transport failure or unparseable response body.
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    /// Non-2xx response without a server-supplied code.
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
    /// A 401 that refreshing the session could not recover.
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
}

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";

/// Every REST call resolves to one of these; `success` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: Option<T>, meta: Option<PaginationMeta>) -> Self {
        Self {
            success: true,
            data,
            message: None,
            error: None,
            code: None,
            meta,
        }
    }

    pub fn failure(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            code: Some(code.into()),
            meta: None,
        }
    }

    pub fn network_error(error: impl Into<String>) -> Self {
        Self::failure(error, codes::NETWORK_ERROR)
    }

    pub fn session_expired() -> Self {
        Self::failure(SESSION_EXPIRED_MESSAGE, codes::SESSION_EXPIRED)
    }

    /// Convert into a `Result`, reading a success without payload as
    /// `T::default()`. Suits list endpoints that send `data: null` when empty.
    pub fn into_result_or_default(self) -> ApiResult<T>
    where
        T: Default,
    {
        if self.success && self.data.is_none() {
            return Ok(T::default());
        }
        self.into_result()
    }

    /// Convert into a `Result`, requiring a payload on success.
    pub fn into_result(self) -> ApiResult<T> {
        if self.success {
            return self.data.ok_or(ApiError::MissingData);
        }

        let message = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "Request failed".to_string());

        Err(match self.code.as_deref() {
            Some(codes::NETWORK_ERROR) => ApiError::Network(message),
            Some(codes::SESSION_EXPIRED) => ApiError::SessionExpired,
            Some(code) => ApiError::Server {
                code: code.to_string(),
                message,
            },
            None => ApiError::Server {
                code: codes::UNKNOWN_ERROR.to_string(),
                message,
            },
        })
    }
}

/// Normalize a received response into the envelope.
///
/// A non-empty body that is not JSON, or a success payload that does not
/// match `T`, is reported as `NETWORK_ERROR`. An empty body reads as no data.
pub(crate) fn normalize<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ApiResponse<T> {
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => return ApiResponse::network_error(format!("Failed to parse response: {e}")),
        }
    };

    if !status.is_success() {
        let error = string_field(&body, "message")
            .or_else(|| string_field(&body, "error"))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        let code = string_field(&body, "code").unwrap_or_else(|| codes::UNKNOWN_ERROR.to_string());
        return ApiResponse::failure(error, code);
    }

    let meta = body
        .get("meta")
        .cloned()
        .and_then(|meta| serde_json::from_value(meta).ok());
    let message = string_field(&body, "message");

    // A `data` key is authoritative even when null; bodies without one are
    // the payload themselves
    let payload = match body.get("data") {
        Some(data) => data.clone(),
        None => body,
    };

    let data = if payload.is_null() {
        None
    } else {
        match serde_json::from_value(payload) {
            Ok(data) => Some(data),
            Err(e) => return ApiResponse::network_error(format!("Failed to decode response: {e}")),
        }
    };

    ApiResponse {
        message,
        ..ApiResponse::success(data, meta)
    }
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

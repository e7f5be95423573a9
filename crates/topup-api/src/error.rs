//! API error types.

use crate::codes;
use thiserror::Error;

/// Failure of a REST call, as seen by callers that prefer `?` over
/// inspecting the envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No response, or a response body that could not be understood
    #[error("Network error: {0}")]
    Network(String),

    /// Error reported by the server
    #[error("{message} ({code})")]
    Server { code: String, message: String },

    /// A 401 could not be recovered by refreshing the session
    #[error("Session expired")]
    SessionExpired,

    /// Successful response without a payload where one was required
    #[error("Response carried no data")]
    MissingData,

    /// The refresh endpoint refused to issue a new token
    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Envelope code equivalent of this error.
    pub fn code(&self) -> &str {
        match self {
            ApiError::Server { code, .. } => code,
            ApiError::SessionExpired => codes::SESSION_EXPIRED,
            ApiError::Network(_) | ApiError::Http(_) | ApiError::Json(_) => codes::NETWORK_ERROR,
            _ => codes::UNKNOWN_ERROR,
        }
    }

    /// Returns true if retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;

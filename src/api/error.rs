//! Transport error types

use thiserror::Error;

/// Fallback message when an error response carries no usable body
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Error raised by any backend call
///
/// `status` is the HTTP status code, or 0 when no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: u16,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message, 0)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message, 0)
    }

    /// Build an error from a non-2xx response
    ///
    /// The message comes from the body's `message` field, then `detail`
    /// (string form only), then `HTTP Error: <status>`. A body that is not
    /// JSON at all yields the generic unknown-error message.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(parsed) => parsed
                .get("message")
                .and_then(serde_json::Value::as_str)
                .or_else(|| parsed.get("detail").and_then(serde_json::Value::as_str))
                .filter(|m| !m.is_empty())
                .map_or_else(|| format!("HTTP Error: {status}"), str::to_string),
            Err(_) => UNKNOWN_ERROR_MESSAGE.to_string(),
        };
        Self::new(ApiErrorKind::from_status(status), message, status)
    }
}

/// Error classification, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection failures, timeouts, truncated bodies
    Network,
    /// 401 / 403
    Auth,
    /// 404
    NotFound,
    /// 400 / 422
    Validation,
    /// 5xx
    Server,
    /// 2xx response whose body did not match the expected shape
    Decode,
    Unknown,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

use serde_json::Value;

use super::retry::RequestAttempt;

/// Whether repeating the identical request can succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    NonRetryable,
}

/// Error types surfaced by the client
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("The service returned no transcript content")]
    EmptyResult,

    #[error("Unexpected HTTP {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Could not decode response: {0}")]
    InvalidResponse(String),

    #[error("Session storage failed: {0}")]
    Storage(String),
}

impl ClientError {
    /// Map a non-success response into the error taxonomy
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_error_message(status, body);
        match status {
            400 | 422 => Self::Validation(message),
            401 => Self::Authentication(message),
            403 => Self::Authorization(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited(message),
            500 => Self::Server(message),
            502 => Self::Gateway(message),
            503 => Self::ServiceUnavailable(message),
            _ => Self::UnexpectedStatus { status, message },
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            Self::RateLimited(_)
            | Self::Server(_)
            | Self::Gateway(_)
            | Self::ServiceUnavailable(_)
            | Self::Network(_) => Classification::Retryable,
            _ => Classification::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classification() == Classification::Retryable
    }

    /// Credential failures that require the user to sign in again
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::MalformedCredential(_))
    }
}

/// Terminal failure of one orchestrated call
#[derive(thiserror::Error, Debug, Clone)]
#[error("{error}")]
pub struct RequestFailure {
    #[source]
    pub error: ClientError,

    /// Number of attempts actually made
    pub attempts: u32,

    /// True when every allowed retry was spent on retryable errors
    pub retries_exhausted: bool,

    /// Failed attempts in order
    pub history: Vec<RequestAttempt>,
}

impl RequestFailure {
    /// Failure raised before any request went out
    pub fn local(error: ClientError) -> Self {
        Self {
            error,
            attempts: 0,
            retries_exhausted: false,
            history: Vec::new(),
        }
    }

    pub fn classification(&self) -> Classification {
        self.error.classification()
    }
}

impl From<RequestFailure> for ClientError {
    fn from(failure: RequestFailure) -> Self {
        failure.error
    }
}

/// Pull a human readable message out of an error body.
///
/// Looks at `detail`, `message` and `error` in that order, then falls back to the raw
/// text and finally to the status reason phrase.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(message) = value.get(key).and_then(message_from_value) {
                return message;
            }
        }
    }

    let text = body.trim();
    if !text.is_empty() && !text.starts_with('{') {
        return text.to_string();
    }

    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|reason| reason.to_string())
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // Validation failures arrive as a list of {loc, msg, type} objects
        Value::Array(items) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("msg").and_then(Value::as_str).map(str::to_string),
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        Value::Object(_) => value
            .get("message")
            .or_else(|| value.get("msg"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

use std::sync::OnceLock;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no response from server: {message}")]
    Network { message: String, timeout: bool },

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("assistant {assistant_id} not found")]
    AssistantNotFound { assistant_id: String },

    #[error("thread {thread_id} not found")]
    ThreadNotFound { thread_id: String },

    #[error("response did not carry a data payload: {0}")]
    InvalidResponse(String),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("access token is configured but blank")]
    MissingAccessToken,
}

impl ApiError {
    #[must_use]
    pub fn network(error: reqwest::Error) -> Self {
        Self::Network {
            timeout: error.is_timeout(),
            message: error.to_string(),
        }
    }

    #[must_use]
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::status(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }

    /// HTTP status carried by this error, when the server answered at all.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True only for HTTP 429; polling loops back off instead of surfacing it.
    pub fn is_rate_limited(&self) -> bool {
        self.http_status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    /// True when the request never produced a response.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Text safe to show directly in a chat transcript.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { .. } => {
                "No response from server. Please check your internet connection.".to_string()
            }
            Self::Status { status, message } => status_user_message(*status, message),
            Self::AssistantNotFound { assistant_id } => {
                format!("Assistant ID {assistant_id} not found. Please verify your configuration.")
            }
            Self::ThreadNotFound { thread_id } => {
                format!("Thread ID {thread_id} not found. The thread may have been deleted.")
            }
            other => format!("Error: {other}"),
        }
    }
}

fn status_user_message(status: StatusCode, message: &str) -> String {
    let detail = Some(message.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| Some(*value) != status.canonical_reason());

    match status.as_u16() {
        400 => match detail {
            Some(detail) => {
                format!("Bad request error: {detail}. Please try a different message.")
            }
            None => "The server couldn't understand the request. Please try a different message format."
                .to_string(),
        },
        401 | 403 => "Authentication error. Please restart the app and try again.".to_string(),
        404 => "The API service could not be found. Please check your connection.".to_string(),
        code if code >= 500 => "The server encountered an error. Please try again later.".to_string(),
        code => format!(
            "Server error ({code}): {}",
            detail
                .or(status.canonical_reason())
                .unwrap_or("Unknown error")
        ),
    }
}

/// Extract a human-readable message from a non-2xx response body.
///
/// Accepts `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; otherwise the raw body, then the canonical reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Some(message) = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(message_from_payload)
    {
        return message;
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn message_from_payload(payload: &Value) -> Option<String> {
    let found = match payload {
        Value::String(text) => Some(text.as_str()),
        Value::Object(fields) => match fields.get("error") {
            Some(Value::String(text)) => Some(text.as_str()),
            Some(Value::Object(inner)) => inner.get("message").and_then(Value::as_str),
            _ => None,
        }
        .or_else(|| fields.get("message").and_then(Value::as_str)),
        _ => None,
    };

    found
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn not_found_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)not[\s_-]*found|\bno\s+(?:assistant|thread)\b.*\bfound\b")
            .expect("not-found regex must compile")
    })
}

/// Map a failed run creation onto the configuration errors it can signal.
pub fn classify_run_creation_error(error: ApiError, assistant_id: &str, thread_id: &str) -> ApiError {
    let ApiError::Status { message, .. } = &error else {
        return error;
    };
    if !not_found_regex().is_match(message) {
        return error;
    }

    let lowered = message.to_ascii_lowercase();
    if lowered.contains("assistant") {
        ApiError::AssistantNotFound {
            assistant_id: assistant_id.to_string(),
        }
    } else if lowered.contains("thread") {
        ApiError::ThreadNotFound {
            thread_id: thread_id.to_string(),
        }
    } else {
        error
    }
}

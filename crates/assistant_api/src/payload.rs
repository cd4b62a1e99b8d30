use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Body for `POST /threads/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub parent_id: String,
    pub child_id: String,
    /// JSON-encoded copy of the profile ids, as the backend stores it.
    pub metadata: String,
}

impl CreateThreadRequest {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        let child_id = child_id.into();
        let metadata = serde_json::json!({
            "parentId": parent_id,
            "childId": child_id,
        })
        .to_string();
        Self {
            parent_id,
            child_id,
            metadata,
        }
    }
}

/// Body for `POST /messages/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub thread_id: String,
    pub content: String,
    /// Always `"user"`; assistant messages are produced by runs.
    pub role: String,
    pub parent_id: String,
    pub child_id: String,
}

impl CreateMessageRequest {
    pub fn user(
        thread_id: impl Into<String>,
        content: impl Into<String>,
        parent_id: impl Into<String>,
        child_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            content: content.into(),
            role: "user".to_string(),
            parent_id: parent_id.into(),
            child_id: child_id.into(),
        }
    }
}

/// Body for `POST /runs/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub thread_id: String,
    pub assistant_id: String,
}

/// Every success response wraps its payload as `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: Option<Value>,
}

/// Decode the `data` member of a success body into `T`.
pub fn decode_data<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let envelope: DataEnvelope = serde_json::from_str(body)?;
    let data = envelope
        .data
        .filter(|value| !value.is_null())
        .ok_or_else(|| ApiError::InvalidResponse(truncate_for_log(body)))?;
    Ok(serde_json::from_value(data)?)
}

fn truncate_for_log(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}

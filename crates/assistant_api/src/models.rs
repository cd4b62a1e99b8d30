//! Wire models for threads, runs and messages.
//!
//! The backend does not fix the shape of message content, so content is
//! decoded from raw JSON into [`MessageContent`] rather than rejected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Conversation container created once per chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One assistant-processing job over a thread's pending messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(
        default,
        alias = "threadId",
        skip_serializing_if = "Option::is_none"
    )]
    pub thread_id: Option<String>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Other(String),
}

impl RunStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            "completed" => Self::Completed,
            "incomplete" => Self::Incomplete,
            "expired" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Other(value) => value,
        }
    }

    /// A run in this state may still be adopted instead of starting a new one.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    /// No further status transitions will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: MessageRole,
    #[serde(default)]
    pub content: MessageContent,
    /// Unix milliseconds; `0` when the backend omitted or garbled it.
    #[serde(default, alias = "createdAt", deserialize_with = "deserialize_timestamp")]
    pub created_at: i64,
    /// Sibling text some backends attach when `content` is null.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        role: MessageRole,
        content: MessageContent,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content,
            created_at,
            text: None,
            value: None,
        }
    }

    /// Assistant message carrying the usual single text block.
    pub fn assistant_text(id: impl Into<String>, text: impl Into<String>, created_at: i64) -> Self {
        Self::new(
            id,
            MessageRole::Assistant,
            MessageContent::text_block(text),
            created_at,
        )
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// Polymorphic message content as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum MessageContent {
    #[default]
    Empty,
    Text(String),
    Blocks(Vec<ContentBlock>),
    /// Bare object exposing a `text` field.
    TextWrapper(TextField),
    Other(Value),
}

impl MessageContent {
    /// `[{"type": "text", "text": {"value": ...}}]`
    pub fn text_block(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::Blocks(vec![ContentBlock::from(serde_json::json!({
            "type": "text",
            "text": { "value": text, "annotations": [] },
        }))])
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Blocks(blocks) => blocks.is_empty(),
            _ => false,
        }
    }
}

impl From<Value> for MessageContent {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Blocks(items.into_iter().map(ContentBlock::from).collect()),
            Value::Object(fields) => match fields.get("text").filter(|text| is_truthy(text)) {
                Some(text) => Self::TextWrapper(TextField::from(text.clone())),
                None => Self::Other(Value::Object(fields)),
            },
            other => Self::Other(other),
        }
    }
}

impl From<MessageContent> for Value {
    fn from(content: MessageContent) -> Self {
        match content {
            MessageContent::Empty => Value::Null,
            MessageContent::Text(text) => Value::String(text),
            MessageContent::Blocks(blocks) => {
                Value::Array(blocks.into_iter().map(|block| block.raw).collect())
            }
            MessageContent::TextWrapper(text) => {
                let mut fields = Map::new();
                fields.insert("text".to_string(), text.into_value());
                Value::Object(fields)
            }
            MessageContent::Other(value) => value,
        }
    }
}

/// One element of a block-array content payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    /// The block's `type` tag, empty when absent.
    pub kind: String,
    pub text: Option<TextField>,
    /// The block exactly as received.
    pub raw: Value,
}

impl ContentBlock {
    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }
}

impl From<Value> for ContentBlock {
    fn from(raw: Value) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text = raw
            .get("text")
            .filter(|value| !value.is_null())
            .cloned()
            .map(TextField::from);
        Self { kind, text, raw }
    }
}

/// The `text` member of a block or wrapper object.
#[derive(Debug, Clone, PartialEq)]
pub enum TextField {
    /// `{"value": "..."}`
    Wrapped(String),
    Plain(String),
    Other(Value),
}

impl TextField {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Wrapped(value) | Self::Plain(value) => Some(value),
            Self::Other(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Wrapped(value) => serde_json::json!({ "value": value }),
            Self::Plain(value) => Value::String(value),
            Self::Other(value) => value,
        }
    }
}

impl From<Value> for TextField {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Plain(text),
            Value::Object(fields) => match fields.get("value").and_then(Value::as_str) {
                Some(text) => Self::Wrapped(text.to_string()),
                None => Self::Other(Value::Object(fields)),
            },
            other => Self::Other(other),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(timestamp_from_value(&value))
}

/// Normalize integer, float, numeric-string and RFC 3339 timestamps to Unix
/// milliseconds. Sub-second precision is kept so messages created within the
/// same second still order correctly.
pub fn timestamp_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(|seconds| seconds.saturating_mul(1000))
            .or_else(|| number.as_f64().map(seconds_to_millis))
            .unwrap_or_default(),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .map(|seconds| seconds.saturating_mul(1000))
                .or_else(|| text.parse::<f64>().ok().map(seconds_to_millis))
                .or_else(|| {
                    OffsetDateTime::parse(text, &Rfc3339)
                        .ok()
                        .map(|instant| (instant.unix_timestamp_nanos() / 1_000_000) as i64)
                })
                .unwrap_or_default()
        }
        _ => 0,
    }
}

fn seconds_to_millis(seconds: f64) -> i64 {
    if seconds.is_finite() {
        (seconds * 1000.0).round() as i64
    } else {
        0
    }
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) if !text.is_empty() => Some(text),
        _ => None,
    })
}

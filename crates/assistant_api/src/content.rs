use serde_json::Value;

use crate::models::{ContentBlock, Message, MessageContent, MessageRole, TextField};

/// Fields checked, in order, when a user message echoes a JSON envelope.
const ENVELOPE_FIELDS: [&str; 3] = ["question", "content", "text"];

/// Fold any message content shape into one display string.
///
/// Priority order:
/// 1) null content: the message's sibling `text`/`value`, else empty
/// 2) block array: the first `text` block's value (user JSON envelopes are
///    unwrapped to their `question`/`content`/`text` field)
/// 3) block array without a text block: the first block's value, else its JSON
/// 4) plain string: as-is
/// 5) object with `text`: that field's `value`, else the field itself
/// 6) anything else: its JSON form
pub fn extract_content(message: &Message) -> String {
    match &message.content {
        MessageContent::Empty => message
            .text
            .clone()
            .or_else(|| message.value.clone())
            .unwrap_or_default(),
        MessageContent::Blocks(blocks) => {
            extract_from_blocks(blocks, message.role == MessageRole::User)
        }
        MessageContent::Text(text) => text.clone(),
        MessageContent::TextWrapper(field) => match field {
            TextField::Wrapped(value) | TextField::Plain(value) => value.clone(),
            TextField::Other(value) => stringify(value),
        },
        MessageContent::Other(value) => stringify(value),
    }
}

fn extract_from_blocks(blocks: &[ContentBlock], is_user: bool) -> String {
    if let Some(block) = blocks.iter().find(|block| block.is_text()) {
        let text = block
            .text
            .as_ref()
            .and_then(TextField::value)
            .unwrap_or_default();
        if is_user && text.starts_with('{') {
            return unwrap_json_envelope(text);
        }
        return text.to_string();
    }

    let Some(first) = blocks.first() else {
        return String::new();
    };
    first
        .text
        .as_ref()
        .and_then(TextField::value)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| stringify(&first.raw))
}

/// Prefer the question a client wrapped in JSON; fall back to the raw text.
pub fn unwrap_json_envelope(text: &str) -> String {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };

    ENVELOPE_FIELDS
        .iter()
        .find_map(|key| {
            fields
                .get(*key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(text)
        .to_string()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

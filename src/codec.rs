//! Message codec: the single chokepoint between the wire shape of a message
//! and its stored JSON representation. Both storage backends go through these
//! functions, so unknown part kinds and passthrough fields are preserved no
//! matter which medium holds the bytes.

use crate::errors::AppError;
use crate::models::ChatMessage;

/// Encodes a full message sequence as a pretty-printed JSON array, the
/// on-disk format of the file backend.
pub fn encode_messages(messages: &[ChatMessage]) -> Result<String, AppError> {
    serde_json::to_string_pretty(messages)
        .map_err(|e| AppError::Unexpected(format!("Failed to encode messages: {e}")))
}

/// Decodes a stored message array. Empty/whitespace content decodes to an
/// empty sequence; anything else must be a JSON array of messages.
pub fn decode_messages(raw: &str) -> Result<Vec<ChatMessage>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

/// Encodes one message for the relational backend's `content` column.
pub fn encode_message(message: &ChatMessage) -> Result<String, AppError> {
    serde_json::to_string(message)
        .map_err(|e| AppError::Unexpected(format!("Failed to encode message {}: {e}", message.id)))
}

/// Decodes one stored `content` column value.
pub fn decode_message(raw: &str) -> Result<ChatMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Structural invariant for a save batch: every message carries a non-empty
/// id, unique within the batch (the id is the reconciliation key, so a
/// duplicate would mean two rows contending for one identity). Roles are
/// enforced by the type system at decode time. Rejects the whole batch
/// before any mutation.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        if message.id.trim().is_empty() {
            return Err(AppError::invalid_message(format!(
                "message at index {index} is missing an id"
            )));
        }
        if !seen.insert(message.id.as_str()) {
            return Err(AppError::invalid_message(format!(
                "duplicate message id '{}' at index {index}",
                message.id
            )));
        }
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Roles ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageRole {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

// ── Message parts ────────────────────────────────────────────────────────────

/// One content fragment of a message.
///
/// Only `text` parts are ever interpreted (for title/preview derivation and
/// model-history replay). Every other kind — file, tool-call, tool-result,
/// and whatever part types future tools introduce — is carried verbatim in
/// [`MessagePart::Opaque`] so it round-trips through storage unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    /// A `{"type": "text", "text": ...}` part. `raw` keeps the original JSON
    /// object so extra fields (streaming state etc.) are not dropped.
    Text { text: String, raw: Value },
    /// Any other part, preserved byte-for-byte (modulo key order).
    Opaque(Value),
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let raw = serde_json::json!({ "type": "text", "text": text });
        MessagePart::Text { text, raw }
    }

    /// The `type` tag of the underlying part object, if present.
    pub fn kind(&self) -> Option<&str> {
        self.as_value().get("type").and_then(Value::as_str)
    }

    /// The text content for `text` parts, `None` for everything else.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text, .. } => Some(text),
            MessagePart::Opaque(_) => None,
        }
    }

    pub fn as_value(&self) -> &Value {
        match self {
            MessagePart::Text { raw, .. } => raw,
            MessagePart::Opaque(value) => value,
        }
    }

    fn classify(value: Value) -> Self {
        let text = value
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| *t == "text")
            .and_then(|_| value.get("text"))
            .and_then(Value::as_str)
            .map(str::to_owned);
        match text {
            Some(text) => MessagePart::Text { text, raw: value },
            None => MessagePart::Opaque(value),
        }
    }
}

impl Serialize for MessagePart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessagePart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(MessagePart::classify(Value::deserialize(deserializer)?))
    }
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// One turn of a chat, in the wire shape the UI exchanges with the server.
///
/// `extra` is a flattened passthrough for top-level fields this server does
/// not model (`createdAt`, `metadata`, ...); they survive save/load intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Builds a server-originated message with a single text part and a
    /// `createdAt` passthrough timestamp, the shape the UI produces itself.
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("createdAt".into(), Value::String(Utc::now().to_rfc3339()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts: vec![MessagePart::text(text)],
            extra,
        }
    }

    /// Concatenated text of all `text` parts, space joined and trimmed.
    /// Empty string when the message carries no extractable text.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    /// The message's `createdAt` passthrough field, when parseable as either
    /// an RFC 3339 string or epoch milliseconds.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.extra.get("createdAt")? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }
}

// ── Derived metadata ─────────────────────────────────────────────────────────

/// Read-only listing view of a chat, derived from its message set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
}

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub message: ChatMessage,
}

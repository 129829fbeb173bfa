use thiserror::Error;

/// Top-level application error. All variants carry a human-readable
/// message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Identifier / structure validation ────────────────────────────────────
    #[error("Invalid chat id format: '{id}'")]
    InvalidChatId { id: String },

    #[error("Invalid message structure: {reason}")]
    InvalidMessage { reason: String },

    // ── Ownership ────────────────────────────────────────────────────────────
    #[error("Chat '{chat_id}' does not belong to the requesting user")]
    Unauthorized { chat_id: String },

    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("Chat store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    /// Stored content that no longer parses. Absorbed by `load`/`list`
    /// (logged, record treated as absent), never surfaced to callers.
    #[error("Corrupt record for chat '{chat_id}': {message}")]
    CorruptRecord { chat_id: String, message: String },

    // ── Prompt validation ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    // ── AI Agent errors ──────────────────────────────────────────────────────
    #[error("Model service unavailable at {host}")]
    AgentUnavailable { host: String },

    #[error("Model '{model_name}' not found")]
    ModelNotFound { model_name: String },

    #[error("Inference error: {message}")]
    InferenceError { message: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn store_unavailable(message: impl Into<String>, source: std::io::Error) -> Self {
        AppError::StoreUnavailable { message: message.into(), source }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        AppError::InvalidMessage { reason: reason.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidChatId { .. }
                | AppError::InvalidMessage { .. }
                | AppError::EmptyField { .. }
                | AppError::FieldTooLong { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized { .. })
    }

    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, AppError::AgentUnavailable { .. })
    }
}

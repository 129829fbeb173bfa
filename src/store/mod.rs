//! Chat persistence. Two backends implement the same [`ChatStore`] contract:
//! one JSON file per chat with atomic-rename writes, or a relational schema
//! with a transactional reconcile. Deployments pick one via configuration;
//! the rest of the application only sees the trait.

mod file_store;
mod sqlite_store;

pub use file_store::FileChatStore;
pub use sqlite_store::SqliteChatStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatMetadata};
use crate::title;

pub type DynChatStore = Arc<dyn ChatStore>;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Creates a new empty chat and returns its id.
    async fn create(&self, user_id: Option<&str>) -> Result<String, AppError>;

    /// Loads the full ordered message sequence for a chat.
    ///
    /// A nonexistent chat is not an error: it loads as an empty sequence so
    /// the caller can start fresh. Corrupt stored content likewise degrades
    /// to empty (with a logged warning) rather than failing the request.
    async fn load(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, AppError>;

    /// Persists the full message sequence for a chat, reconciling it against
    /// whatever is already stored: new ids are inserted, existing ids are
    /// overwritten, stored ids absent from `messages` are deleted. Applied
    /// atomically together with the derived title/preview state.
    async fn save(
        &self,
        chat_id: &str,
        messages: &[ChatMessage],
        user_id: Option<&str>,
    ) -> Result<(), AppError>;

    /// Lists non-empty chats visible to `user_id`, newest first. Corrupt
    /// individual records are skipped, never fatal to the listing.
    async fn list(&self, user_id: Option<&str>) -> Result<Vec<ChatMetadata>, AppError>;

    /// Human-readable title for a chat; `"New Chat"` when it has no content.
    async fn title(&self, chat_id: &str, user_id: Option<&str>) -> Result<String, AppError> {
        let messages = self.load(chat_id, user_id).await?;
        Ok(title::derive_title(&messages))
    }
}

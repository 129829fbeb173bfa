use tracing::{error, warn};

use crate::agent::AgentService;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatMetadata, ChatRequest, ChatResponse, MessageRole};
use crate::store::DynChatStore;

const MAX_MESSAGE_LENGTH: usize = 8000;

/// Orchestrates one chat turn: resolve the chat, load history, run the
/// model, and hand the full transcript back to the store for reconciliation.
#[derive(Clone)]
pub struct ChatService {
    store: DynChatStore,
    agent: AgentService,
}

impl ChatService {
    pub fn new(store: DynChatStore, agent: AgentService) -> Self {
        Self { store, agent }
    }

    pub async fn create_chat(&self, user_id: Option<&str>) -> Result<String, AppError> {
        self.store.create(user_id).await
    }

    pub async fn get_chats(&self, user_id: Option<&str>) -> Result<Vec<ChatMetadata>, AppError> {
        self.store.list(user_id).await
    }

    pub async fn get_messages(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, AppError> {
        self.store.load(chat_id, user_id).await
    }

    pub async fn get_title(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<String, AppError> {
        match self.store.title(chat_id, user_id).await {
            Ok(title) => Ok(title),
            Err(e) if e.is_validation() || e.is_unauthorized() => Err(e),
            Err(e) => {
                // Storage trouble degrades to a generic label; the sidebar
                // must stay usable.
                warn!("Failed to derive title for chat {chat_id}: {e}");
                Ok("Chat".to_string())
            }
        }
    }

    pub async fn chat(
        &self,
        request: ChatRequest,
        user_id: Option<&str>,
    ) -> Result<ChatResponse, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        if request.message.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "message".to_string() });
        }
        if request.message.len() > MAX_MESSAGE_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "message".to_string(),
                max_length: MAX_MESSAGE_LENGTH,
                actual_length: request.message.len(),
            });
        }

        // ── Resolve or create the chat ────────────────────────────────────────
        let chat_id = match request.chat_id {
            Some(id) => id,
            None => self.store.create(user_id).await?,
        };

        // Ownership is checked here; Unauthorized propagates before any write.
        let history = self.store.load(&chat_id, user_id).await?;

        // ── Run the model turn ────────────────────────────────────────────────
        let user_message = ChatMessage::new(MessageRole::User, request.message.clone());
        let assistant_message = self
            .agent
            .chat(&chat_id, &history, &request.message)
            .await?;

        // ── Persist the full transcript ───────────────────────────────────────
        let mut transcript = history;
        transcript.push(user_message);
        transcript.push(assistant_message.clone());

        // The reply already exists by this point; there is no channel left to
        // report a persistence failure over, so it is logged, not surfaced.
        if let Err(e) = self.store.save(&chat_id, &transcript, user_id).await {
            error!("Failed to persist chat {chat_id} after completed turn: {e}");
        }

        Ok(ChatResponse { chat_id, message: assistant_message })
    }
}

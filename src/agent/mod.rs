use rig::client::Nothing;
use rig::completion::Chat;
use rig::message::Message as RigMessage;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use tracing::error;

use crate::errors::AppError;
use crate::models::{ChatMessage, MessageRole};

const PREAMBLE: &str = "You are a helpful AI assistant with access to web search capabilities. \
                        Use the search tool for current events, recent data, or anything you are \
                        unsure about; answer from your own knowledge otherwise. \
                        Be concise, accurate, and cite sources when you searched.";

/// Rebuilds the model-facing history from stored messages. Only text content
/// is replayed; tool-call/tool-result parts are opaque to the model replay
/// and system prompts are carried by the preamble instead.
fn to_rig_history(messages: &[ChatMessage]) -> Vec<RigMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let text = m.text_content();
            if text.is_empty() {
                return None;
            }
            match m.role {
                MessageRole::User => Some(RigMessage::user(&text)),
                MessageRole::Assistant => Some(RigMessage::assistant(&text)),
                MessageRole::System | MessageRole::Tool => None,
            }
        })
        .collect()
}

/// Runs a single chat turn against the model host via rig. A fresh agent is
/// built per request so the history is replayed from storage each time.
#[derive(Clone)]
pub struct AgentService {
    client: ollama::Client,
    base_url: String,
    model: String,
}

impl AgentService {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .expect("Failed to build model client");
        Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    /// Sends one turn to the model, replaying `history` as context, and
    /// returns the assistant reply as a storable message.
    pub async fn chat(
        &self,
        chat_id: &str,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<ChatMessage, AppError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(PREAMBLE)
            .build();

        let rig_history = to_rig_history(history);

        let content = agent
            .chat(user_message, rig_history)
            .await
            .map_err(|e| {
                error!("Inference failed for chat {chat_id}: {e}");
                let msg = e.to_string();
                if msg.contains("Connection refused") || msg.contains("connect") {
                    AppError::AgentUnavailable { host: self.base_url.clone() }
                } else if msg.contains("model") {
                    AppError::ModelNotFound { model_name: self.model.clone() }
                } else {
                    AppError::InferenceError { message: msg }
                }
            })?;

        Ok(ChatMessage::new(MessageRole::Assistant, content))
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::warn;

use crate::chat_id;
use crate::codec;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatMetadata};
use crate::store::ChatStore;
use crate::title;

/// File-per-chat backend: `<dir>/<id>.json` holds the pretty-printed message
/// array. Writes land in a `.tmp` sibling first and are moved into place
/// with an atomic rename, so a reader (or a crash) never observes a
/// partially-written chat.
///
/// This backend records no ownership; it serves single-tenant deployments
/// and ignores `user_id` on every operation.
#[derive(Clone)]
pub struct FileChatStore {
    dir: PathBuf,
}

impl FileChatStore {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    /// Safe to call concurrently: `create_dir_all` is idempotent.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::store_unavailable(
                format!("Failed to create chat directory {}", dir.display()),
                e,
            ))?;
        Ok(Self { dir })
    }

    fn chat_file(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write_atomic(&self, id: &str, content: &str) -> Result<(), AppError> {
        let target = self.chat_file(id);
        let tmp = self.dir.join(format!("{id}.json.tmp"));
        fs::write(&tmp, content).await.map_err(|e| {
            AppError::store_unavailable(format!("Failed to write chat {id}"), e)
        })?;
        // The rename is the commit point.
        fs::rename(&tmp, &target).await.map_err(|e| {
            AppError::store_unavailable(format!("Failed to commit chat {id}"), e)
        })
    }

    /// Reads and decodes one chat file. Missing file and corrupt content
    /// both degrade to an empty sequence.
    async fn read_messages(&self, id: &str) -> Vec<ChatMessage> {
        let file = self.chat_file(id);
        let raw = match fs::read_to_string(&file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read chat {id}: {e}");
                return Vec::new();
            }
        };
        match codec::decode_messages(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                let err = AppError::CorruptRecord {
                    chat_id: id.to_string(),
                    message: e.to_string(),
                };
                warn!("{err}; returning empty history");
                Vec::new()
            }
        }
    }

    /// Listing timestamp: the last message's `createdAt` passthrough field
    /// when parseable, else the file's mtime.
    async fn chat_timestamp(&self, id: &str, messages: &[ChatMessage]) -> DateTime<Utc> {
        if let Some(ts) = messages.last().and_then(ChatMessage::created_at) {
            return ts;
        }
        file_mtime(&self.chat_file(id)).await.unwrap_or_else(Utc::now)
    }
}

async fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs::metadata(path).await.ok()?;
    let mtime = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}

#[async_trait]
impl ChatStore for FileChatStore {
    async fn create(&self, _user_id: Option<&str>) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.write_atomic(&id, "[]").await?;
        Ok(id)
    }

    async fn load(
        &self,
        chat_id: &str,
        _user_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let id = chat_id::sanitize(chat_id)?;
        Ok(self.read_messages(id).await)
    }

    async fn save(
        &self,
        chat_id: &str,
        messages: &[ChatMessage],
        _user_id: Option<&str>,
    ) -> Result<(), AppError> {
        let id = chat_id::sanitize(chat_id)?;
        codec::validate_messages(messages)?;
        // The file always holds the full sequence, so replacing it wholesale
        // is exactly the insert/update/delete reconcile: whatever the caller
        // omitted is gone after the rename.
        let content = codec::encode_messages(messages)?;
        self.write_atomic(id, &content).await
    }

    async fn list(&self, _user_id: Option<&str>) -> Result<Vec<ChatMetadata>, AppError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list chat directory {}: {e}", self.dir.display());
                return Ok(Vec::new());
            }
        };

        let mut chats = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read chat directory entry: {e}");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Only finished chat files; in-flight `.tmp` writes are invisible.
            let Some(id) = name.strip_suffix(".json") else { continue };
            if !chat_id::validate(id) {
                continue;
            }

            let messages = self.read_messages(id).await;
            if messages.is_empty() {
                // Empty and corrupt chats are both omitted from the listing.
                continue;
            }

            chats.push(ChatMetadata {
                id: id.to_string(),
                title: title::derive_title(&messages),
                last_message: title::derive_preview(&messages),
                timestamp: self.chat_timestamp(id, &messages).await,
                message_count: messages.len(),
            });
        }

        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(chats)
    }
}

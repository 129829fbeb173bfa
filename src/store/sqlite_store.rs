use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::chat_id;
use crate::codec;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatMetadata};
use crate::store::ChatStore;
use crate::title;

/// Relational backend: `chats` and `messages` tables, with the save-time
/// reconcile (insert/update/delete by message id) and the derived-metadata
/// refresh wrapped in a single transaction. Title, preview and message
/// count are cached columns, recomputed inside every save.
#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    /// Connects to `url` (e.g. `sqlite:chats.db` or `sqlite::memory:`) and
    /// initializes the schema. Schema setup is `IF NOT EXISTS` throughout,
    /// so concurrent first use is safe.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::db_query(format!("Invalid database url {url}"), e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database exists per connection, so it must be pinned
        // to a single one. File-backed databases get a real pool: WAL allows
        // readers alongside a writer, so requests for different chats do not
        // queue behind each other.
        let max_connections = if is_memory_url(url) { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| AppError::db_query("Failed to connect to SQLite", e))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                title TEXT NOT NULL DEFAULT 'New Chat',
                last_message TEXT NOT NULL DEFAULT 'No messages yet',
                message_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                position INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (id, chat_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, position)",
            "CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, updated_at)",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::db_query("Failed to initialize schema", e))?;
        }
        Ok(())
    }

    /// Access to the underlying pool, mainly for tests and diagnostics.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Owner column for a chat: `None` if the chat does not exist, `Some(owner)`
/// otherwise (owner itself optional for unowned chats).
async fn fetch_owner<'c, E>(executor: E, chat_id: &str) -> Result<Option<Option<String>>, AppError>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    sqlx::query_scalar::<_, Option<String>>("SELECT user_id FROM chats WHERE id = $1")
        .bind(chat_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| AppError::db_query(format!("Failed to look up chat {chat_id}"), e))
}

/// Ownership rule: a mismatch between a recorded owner and a supplied
/// user id is `Unauthorized`. Unowned chats and ownerless callers pass.
fn check_access(
    chat_id: &str,
    owner: &Option<String>,
    user_id: Option<&str>,
) -> Result<(), AppError> {
    match (owner.as_deref(), user_id) {
        (Some(owner), Some(user)) if owner != user => Err(AppError::Unauthorized {
            chat_id: chat_id.to_string(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn create(&self, user_id: Option<&str>) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO chats (id, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $3)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::db_query("Failed to create chat", e))?;
        Ok(id)
    }

    async fn load(
        &self,
        chat_id: &str,
        user_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let id = chat_id::sanitize(chat_id)?;

        let Some(owner) = fetch_owner(&self.pool, id).await? else {
            // Nonexistent chat: start fresh.
            return Ok(Vec::new());
        };
        check_access(id, &owner, user_id)?;

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT content FROM messages WHERE chat_id = $1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db_query(format!("Failed to fetch messages for chat {id}"), e))?;

        let mut messages = Vec::with_capacity(rows.len());
        for content in rows {
            match codec::decode_message(&content) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    // A single unparseable record is dropped, not fatal.
                    let err = AppError::CorruptRecord {
                        chat_id: id.to_string(),
                        message: e.to_string(),
                    };
                    warn!("{err}; skipping record");
                }
            }
        }
        Ok(messages)
    }

    async fn save(
        &self,
        chat_id: &str,
        messages: &[ChatMessage],
        user_id: Option<&str>,
    ) -> Result<(), AppError> {
        let id = chat_id::sanitize(chat_id)?;
        codec::validate_messages(messages)?;

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::db_query("Failed to begin transaction", e))?;

        match fetch_owner(&mut *tx, id).await? {
            Some(owner) => check_access(id, &owner, user_id)?,
            None => {
                // Saving into a chat the store has never seen creates it,
                // owned by the caller.
                sqlx::query(
                    "INSERT INTO chats (id, user_id, created_at, updated_at)
                     VALUES ($1, $2, $3, $3)",
                )
                .bind(id)
                .bind(user_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::db_query(format!("Failed to create chat {id}"), e))?;
            }
        }

        let stored_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM messages WHERE chat_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::db_query(format!("Failed to fetch message ids for chat {id}"), e)
                })?;

        // Reconcile by message id: upsert everything incoming, then drop
        // stored rows the caller no longer has.
        let incoming: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();

        for (position, message) in messages.iter().enumerate() {
            let content = codec::encode_message(message)?;
            let created_at = message.created_at().unwrap_or(now);
            sqlx::query(
                "INSERT INTO messages (id, chat_id, role, content, position, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id, chat_id) DO UPDATE
                 SET role = excluded.role,
                     content = excluded.content,
                     position = excluded.position",
            )
            .bind(&message.id)
            .bind(id)
            .bind(message.role.as_str())
            .bind(&content)
            .bind(position as i64)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::db_query(format!("Failed to upsert message {}", message.id), e)
            })?;
        }

        for stale in stored_ids.iter().filter(|sid| !incoming.contains(sid.as_str())) {
            sqlx::query("DELETE FROM messages WHERE chat_id = $1 AND id = $2")
                .bind(id)
                .bind(stale)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::db_query(format!("Failed to delete message {stale}"), e))?;
        }

        // Derived metadata is recomputed from the new sequence inside the
        // same transaction, so it can never go stale relative to the rows.
        sqlx::query(
            "UPDATE chats
             SET title = $1, last_message = $2, message_count = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(title::derive_title(messages))
        .bind(title::derive_preview(messages))
        .bind(messages.len() as i64)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::db_query(format!("Failed to update chat {id}"), e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::db_query("Failed to commit save", e))
    }

    async fn list(&self, user_id: Option<&str>) -> Result<Vec<ChatMetadata>, AppError> {
        let query = match user_id {
            Some(user) => sqlx::query(
                "SELECT id, title, last_message, message_count, updated_at
                 FROM chats
                 WHERE message_count > 0 AND user_id = $1
                 ORDER BY updated_at DESC",
            )
            .bind(user),
            None => sqlx::query(
                "SELECT id, title, last_message, message_count, updated_at
                 FROM chats
                 WHERE message_count > 0
                 ORDER BY updated_at DESC",
            ),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::db_query("Failed to list chats", e))?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            match read_metadata(&row) {
                Ok(meta) => chats.push(meta),
                Err(e) => warn!("Skipping corrupt chat record in listing: {e}"),
            }
        }
        Ok(chats)
    }

    async fn title(&self, chat_id: &str, user_id: Option<&str>) -> Result<String, AppError> {
        let id = chat_id::sanitize(chat_id)?;
        let Some(owner) = fetch_owner(&self.pool, id).await? else {
            return Ok(title::DEFAULT_TITLE.to_string());
        };
        check_access(id, &owner, user_id)?;
        sqlx::query_scalar::<_, String>("SELECT title FROM chats WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::db_query(format!("Failed to fetch title for chat {id}"), e))
    }
}

fn read_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMetadata, sqlx::Error> {
    let message_count: i64 = row.try_get("message_count")?;
    Ok(ChatMetadata {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        last_message: row.try_get("last_message")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        message_count: message_count as usize,
    })
}

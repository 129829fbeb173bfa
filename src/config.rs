use std::env;

/// Which persistence backend this deployment uses. The choice is made once
/// at startup; business logic never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StoreBackend,
    /// Chat directory for the file backend.
    pub chat_dir: String,
    /// Database url for the relational backend.
    pub database_url: String,
    pub model_base_url: String,
    pub model_name: String,
    pub port: u16,
}

impl AppConfig {
    /// Reads configuration from the environment, with development defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match env::var("CHAT_STORE_BACKEND").as_deref() {
            Ok("sqlite") => StoreBackend::Sqlite,
            Ok("file") | Err(_) => StoreBackend::File,
            Ok(other) => anyhow::bail!("Unknown CHAT_STORE_BACKEND '{other}' (expected 'file' or 'sqlite')"),
        };

        Ok(Self {
            backend,
            chat_dir: env::var("CHAT_DATA_DIR").unwrap_or_else(|_| ".chats".to_string()),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:chats.db".to_string()),
            model_base_url: env::var("OLLAMA_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model_name: env::var("CHAT_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            port: env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080),
        })
    }
}

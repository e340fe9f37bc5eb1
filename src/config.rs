use std::env;
use std::path::PathBuf;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,

    pub ollama_base_url: String,
    pub ollama_model: String,

    pub rag_base_url: String,
    pub rag_api_key: String,
    pub rag_credential_key: String,
    pub rag_index_name: String,
    pub rag_permission_groups: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            host: env_or("GAVEL_HOST", "0.0.0.0"),
            port: env::var("GAVEL_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            data_dir: PathBuf::from(env_or("GAVEL_DATA_DIR", "data")),
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: env_or("OLLAMA_MODEL", "gemma3:1b"),
            rag_base_url: env_or("RAG_BASE_URL", "http://localhost:8000"),
            rag_api_key: env_or("RAG_API_KEY", ""),
            rag_credential_key: env_or("RAG_CREDENTIAL_KEY", ""),
            rag_index_name: env_or("RAG_INDEX_NAME", ""),
            rag_permission_groups: env_or("RAG_PERMISSION_GROUPS", "user")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("review.db")
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

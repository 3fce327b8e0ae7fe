//! Memory system implementations for MiniLuma.
//!
//! Long-term conversational memory goes through the
//! [`MemoryBackend`](miniluma_core::MemoryBackend) implementations here;
//! [`MemoryLog`] is the short, in-process record of a session's actions.

pub mod in_memory;
pub mod log;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryBackend;
pub use log::{LogItem, MemoryLog};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use miniluma_config::MemoryConfig;
use miniluma_core::error::MemoryError;
use miniluma_core::memory::MemoryBackend;
use std::sync::Arc;

/// A fresh memory ID: `mem_{unix_secs}_{8 hex chars}`.
///
/// Only `[A-Za-z0-9_]` characters, so it can be typed after `-m`.
pub fn generate_memory_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("mem_{}_{}", chrono::Utc::now().timestamp(), &suffix[..8])
}

/// Build the configured backend.
pub async fn create_backend(config: &MemoryConfig) -> Result<Arc<dyn MemoryBackend>, MemoryError> {
    match config.backend.as_str() {
        "in_memory" | "memory" => Ok(Arc::new(InMemoryBackend::with_max_items(config.max_items))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteBackend::open(&config.db_path()).await?)),
        other => Err(MemoryError::Storage(format!("Unknown memory backend '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_id_shape() {
        let id = generate_memory_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "mem");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert_ne!(id, generate_memory_id());
    }

    #[tokio::test]
    async fn factory_builds_configured_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            backend: "sqlite".into(),
            path: Some(dir.path().join("m.db").display().to_string()),
            max_items: 10,
        };
        assert_eq!(create_backend(&config).await.unwrap().name(), "sqlite");

        let config = MemoryConfig {
            backend: "in_memory".into(),
            ..config
        };
        assert_eq!(create_backend(&config).await.unwrap().name(), "in_memory");

        let config = MemoryConfig {
            backend: "redis".into(),
            ..config
        };
        assert!(create_backend(&config).await.is_err());
    }
}

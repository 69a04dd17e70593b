//! Per-session turn history.
//!
//! The pipeline only needs two capabilities from a store: load the prior
//! turns of a session and append new ones. When no store is available the
//! pipeline runs stateless.

use arag_core::config::AppConfig;
use arag_core::{AppError, AppResult};
use arag_llm::{ChatMessage, Role};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Turns recorded under `session_id`, oldest first. Unknown sessions are empty.
    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>>;

    /// Append `turns` after the existing history of `session_id`.
    async fn append(&self, session_id: &str, turns: &[ChatMessage]) -> AppResult<()>;
}

/// Open the configured store, or `None` for stateless operation.
///
/// A disabled setting or a store that cannot be opened is not an error.
pub async fn open_store(config: &AppConfig) -> Option<Arc<dyn ConversationStore>> {
    if !config.memory.enabled {
        tracing::debug!("Conversation memory disabled");
        return None;
    }

    let path = config.memory_db_path();
    match SqliteConversationStore::open(&path).await {
        Ok(store) => {
            tracing::info!("Conversation memory enabled at {:?}", path);
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!("Conversation store unavailable, running stateless: {}", e);
            None
        }
    }
}

/// SQLite-backed store. All statements run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (creating if needed) the database at `path` and run `setup`.
    pub async fn open(path: &Path) -> AppResult<Self> {
        let owned = path.to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> AppResult<Connection> {
            if let Some(parent) = owned.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Knowledge(format!("Failed to create memory directory: {}", e))
                })?;
            }
            let conn = Connection::open(&owned)
                .map_err(|e| AppError::Knowledge(format!("Failed to open memory DB: {}", e)))?;
            setup(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| AppError::Other(format!("Memory task failed: {}", e)))??;

        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Knowledge("Memory DB lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Other(format!("Memory task failed: {}", e)))?
    }
}

/// Create the turn table if it does not exist.
pub fn setup(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_turns (
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (session_id, seq)
        );
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create memory tables: {}", e)))
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT role, content FROM conversation_turns
                     WHERE session_id = ?1 ORDER BY seq",
                )
                .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| AppError::Knowledge(format!("Failed to load history: {}", e)))?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row
                    .map_err(|e| AppError::Knowledge(format!("Failed to read turn: {}", e)))?;
                match Role::parse(&role) {
                    Some(role) => messages.push(ChatMessage::new(role, content)),
                    None => tracing::warn!("Skipping turn with unknown role {:?}", role),
                }
            }
            Ok(messages)
        })
        .await
    }

    async fn append(&self, session_id: &str, turns: &[ChatMessage]) -> AppResult<()> {
        if turns.is_empty() {
            return Ok(());
        }
        let session_id = session_id.to_string();
        let turns = turns.to_vec();

        self.with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

            let next: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), -1) + 1 FROM conversation_turns WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Knowledge(format!("Failed to read sequence: {}", e)))?;

            let now = chrono::Utc::now().to_rfc3339();
            for (offset, turn) in turns.iter().enumerate() {
                tx.execute(
                    "INSERT INTO conversation_turns (session_id, seq, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        session_id,
                        next + offset as i64,
                        turn.role.as_str(),
                        turn.content,
                        now
                    ],
                )
                .map_err(|e| AppError::Knowledge(format!("Failed to append turn: {}", e)))?;
            }

            tx.commit()
                .map_err(|e| AppError::Knowledge(format!("Failed to commit turns: {}", e)))
        })
        .await
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    sessions: tokio::sync::Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn history(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: &[ChatMessage]) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(turns.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exchange(q: &str, a: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(q), ChatMessage::assistant(a)]
    }

    #[tokio::test]
    async fn test_sqlite_history_persists_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("memory.sqlite");

        {
            let store = SqliteConversationStore::open(&path).await.unwrap();
            store.append("s1", &exchange("hi", "Hello.")).await.unwrap();
            store
                .append("s1", &exchange("my name is Ana", "Nice to meet you."))
                .await
                .unwrap();
            store.append("s2", &exchange("other", "Other.")).await.unwrap();
        }

        let reopened = SqliteConversationStore::open(&path).await.unwrap();
        let history = reopened.history("s1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("hi"));
        assert_eq!(history[3], ChatMessage::assistant("Nice to meet you."));

        assert_eq!(reopened.history("s2").await.unwrap().len(), 2);
        assert!(reopened.history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_partitions_sessions() {
        let store = MemoryConversationStore::new();
        store.append("a", &exchange("q1", "a1")).await.unwrap();
        store.append("b", &exchange("q2", "a2")).await.unwrap();
        store.append("a", &[]).await.unwrap();

        let a = store.history("a").await.unwrap();
        assert_eq!(a, exchange("q1", "a1"));
        assert_eq!(store.history("b").await.unwrap()[0].content, "q2");
    }

    #[tokio::test]
    async fn test_open_store_disabled_is_stateless() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        assert!(open_store(&config).await.is_none());

        config.memory.enabled = true;
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(config.memory_db_path().exists());
    }

    #[tokio::test]
    async fn test_open_store_failure_degrades() {
        let temp = TempDir::new().unwrap();
        // A directory where the database file should be
        let blocked = temp.path().join("memory.sqlite");
        std::fs::create_dir_all(&blocked).unwrap();

        let mut config = AppConfig::default();
        config.memory.enabled = true;
        config.memory.path = Some(blocked);
        assert!(open_store(&config).await.is_none());
    }
}

use crate::error::{KaiwaError, Result};
use crate::providers::Role;
use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

pub mod types;
pub use types::{Conversation, ConversationSummary, StoredMessage};

/// Storage backend for conversations and their messages
///
/// Two relations: `conversations` and `messages` foreign-keyed to
/// conversations, with per-conversation sequence positions assigned at
/// insert time. All operations are transactionally atomic with respect to
/// each other.
pub struct SqliteStorage {
    db_path: PathBuf,
}

/// Parse a stored RFC-3339 timestamp, falling back to now on corruption
fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SqliteStorage {
    /// Create a new storage instance
    ///
    /// Initializes the database file in the user's data directory.
    pub fn new() -> Result<Self> {
        // Allow override of the chat DB path via environment variable.
        // This makes it easy to point the binary at a test DB or alternate
        // file without changing the user's application data dir.
        if let Ok(override_path) = std::env::var("KAIWA_HISTORY_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("dev", "kaiwa", "kaiwa")
            .ok_or_else(|| KaiwaError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let db_path = data_dir.join("chats.db");
        let storage = Self { db_path };

        storage.init()?;

        Ok(storage)
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// This is primarily useful for tests where the default application data
    /// directory is not desirable (for example, using a temporary directory).
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::storage::SqliteStorage;
    ///
    /// let storage = SqliteStorage::new_with_path("/tmp/test_chats.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| KaiwaError::Storage(e.to_string()))?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Open a connection to the database file
    ///
    /// A busy timeout is set so writers for different conversations can
    /// proceed concurrently without surfacing transient lock errors.
    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                conversation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (conversation_id, seq),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Create a new conversation
    ///
    /// The id must be caller-supplied and globally unique.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::AlreadyExists` if the id is already present
    pub fn create_conversation(&self, id: &str, title: &str) -> Result<Conversation> {
        let mut conn = self.open()?;
        let now = Utc::now();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?",
                params![id],
                |_| Ok(true),
            )
            .optional()
            .context("Failed to check conversation existence")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?
            .unwrap_or(false);

        if exists {
            return Err(KaiwaError::AlreadyExists(id.to_string()).into());
        }

        tx.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            params![id, title, now.to_rfc3339(), now.to_rfc3339()],
        )
        .context("Failed to insert conversation")
        .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        Ok(Conversation {
            id: id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a single conversation by id
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::NotFound` if the conversation id is unknown
    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let conn = self.open()?;

        let row = conn
            .query_row(
                "SELECT id, title, created_at, updated_at
                 FROM conversations WHERE id = ?",
                params![id],
                |row| {
                    let id: String = row.get(0)?;
                    let title: String = row.get(1)?;
                    let created_at: String = row.get(2)?;
                    let updated_at: String = row.get(3)?;
                    Ok((id, title, created_at, updated_at))
                },
            )
            .optional()
            .context("Failed to query conversation")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        match row {
            Some((id, title, created_at, updated_at)) => Ok(Conversation {
                id,
                title,
                created_at: parse_ts(&created_at),
                updated_at: parse_ts(&updated_at),
            }),
            None => Err(KaiwaError::NotFound(id.to_string()).into()),
        }
    }

    /// List all conversations, most-recently-updated first
    pub fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.title, c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
                 FROM conversations c
                 ORDER BY c.updated_at DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let updated_at: String = row.get(3)?;
                let message_count: i64 = row.get(4)?;
                Ok(ConversationSummary {
                    id,
                    title,
                    created_at: parse_ts(&created_at),
                    updated_at: parse_ts(&updated_at),
                    message_count: message_count as usize,
                })
            })
            .context("Failed to query conversations")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let mut conversations = Vec::new();
        for c in rows.flatten() {
            conversations.push(c);
        }

        Ok(conversations)
    }

    /// Append a message to a conversation
    ///
    /// Atomically inserts the message at the next sequence position and
    /// bumps the conversation's `updated_at` timestamp (which never goes
    /// backwards, even under clock skew).
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::NotFound` if the conversation id is unknown
    pub fn append_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<StoredMessage> {
        let mut conn = self.open()?;
        let now = Utc::now();

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let current_updated: Option<String> = tx
            .query_row(
                "SELECT updated_at FROM conversations WHERE id = ?",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check conversation existence")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let Some(current_updated) = current_updated else {
            return Err(KaiwaError::NotFound(conversation_id.to_string()).into());
        };

        let seq: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE conversation_id = ?",
                params![conversation_id],
                |row| row.get(0),
            )
            .context("Failed to assign sequence position")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        tx.execute(
            "INSERT INTO messages (conversation_id, seq, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![conversation_id, seq, role.as_str(), content, now.to_rfc3339()],
        )
        .context("Failed to insert message")
        .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let updated_at = parse_ts(&current_updated).max(now);
        tx.execute(
            "UPDATE conversations SET updated_at = ? WHERE id = ?",
            params![updated_at.to_rfc3339(), conversation_id],
        )
        .context("Failed to bump conversation timestamp")
        .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        Ok(StoredMessage {
            conversation_id: conversation_id.to_string(),
            seq,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// List the messages of a conversation by sequence position, oldest first
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::NotFound` if the conversation id is unknown
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let conn = self.open()?;

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?",
                params![conversation_id],
                |_| Ok(true),
            )
            .optional()
            .context("Failed to check conversation existence")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?
            .unwrap_or(false);

        if !exists {
            return Err(KaiwaError::NotFound(conversation_id.to_string()).into());
        }

        let mut stmt = conn
            .prepare(
                "SELECT conversation_id, seq, role, content, created_at
                 FROM messages
                 WHERE conversation_id = ?
                 ORDER BY seq ASC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![conversation_id], |row| {
                let conversation_id: String = row.get(0)?;
                let seq: i64 = row.get(1)?;
                let role: String = row.get(2)?;
                let content: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok((conversation_id, seq, role, content, created_at))
            })
            .context("Failed to query messages")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let mut messages = Vec::new();
        for row in rows.flatten() {
            let (conversation_id, seq, role, content, created_at) = row;
            let role = Role::parse_str(&role).map_err(KaiwaError::Storage)?;
            messages.push(StoredMessage {
                conversation_id,
                seq,
                role,
                content,
                created_at: parse_ts(&created_at),
            });
        }

        Ok(messages)
    }

    /// Delete a conversation and all its messages as one atomic unit
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::NotFound` if the conversation id is unknown;
    /// in that case nothing is deleted
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut conn = self.open()?;

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?",
            params![conversation_id],
        )
        .context("Failed to delete messages")
        .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        let deleted = tx
            .execute(
                "DELETE FROM conversations WHERE id = ?",
                params![conversation_id],
            )
            .context("Failed to delete conversation")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        if deleted == 0 {
            // Dropping the transaction rolls back the message deletion.
            return Err(KaiwaError::NotFound(conversation_id.to_string()).into());
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Rename a conversation
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::NotFound` if the conversation id is unknown
    pub fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<()> {
        let conn = self.open()?;
        let now = Utc::now();

        let updated = conn
            .execute(
                "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?",
                params![title, now.to_rfc3339(), conversation_id],
            )
            .context("Failed to rename conversation")
            .map_err(|e| KaiwaError::Storage(e.to_string()))?;

        if updated == 0 {
            return Err(KaiwaError::NotFound(conversation_id.to_string()).into());
        }

        Ok(())
    }
}

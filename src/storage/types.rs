use crate::providers::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for the conversation
    pub id: String,
    /// User- or system-assigned title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated; never decreases
    pub updated_at: DateTime<Utc>,
}

/// Listing row for a stored conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Unique identifier for the conversation
    pub id: String,
    /// User- or system-assigned title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
    /// Number of messages in the conversation
    pub message_count: usize,
}

/// One persisted turn of a conversation
///
/// Messages are append-only: once inserted they are never mutated, and
/// their `seq` order equals insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Owning conversation id
    pub conversation_id: String,
    /// Sequence position, strictly increasing per conversation from 0
    pub seq: i64,
    /// Author of the message
    pub role: Role,
    /// UTF-8 text content
    pub content: String,
    /// When the message was inserted
    pub created_at: DateTime<Utc>,
}

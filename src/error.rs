//! Error types for Kaiwa
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Kaiwa operations
///
/// This enum encompasses all possible errors that can occur during
/// session orchestration, configuration loading, Gemini API calls,
/// and conversation persistence.
#[derive(Error, Debug)]
pub enum KaiwaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing API credentials
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Unknown conversation id
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// Conversation id collision on create
    #[error("Conversation already exists: {0}")]
    AlreadyExists(String),

    /// Operation conflicts with an in-flight generation
    #[error("Conversation is busy: {0}")]
    Busy(String),

    /// Retry requested but there is no pending user turn
    #[error("Nothing to retry for conversation: {0}")]
    NothingToRetry(String),

    /// Remote generation errors (network, quota, malformed response)
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Kaiwa operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

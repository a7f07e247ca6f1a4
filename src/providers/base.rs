//! Base model client trait and common types for Kaiwa
//!
//! This module defines the ModelClient trait that remote model adapters must
//! implement, along with the message role tag, conversation turn type, and
//! model metadata used for model discovery.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use futures::Stream;

/// Author of a conversation turn
///
/// A closed two-variant tag used throughout the data model. Translation into
/// the remote protocol's role vocabulary (Gemini uses `"user"`/`"model"`)
/// is isolated inside the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message authored by the human user
    User,
    /// A message authored by the model
    Assistant,
}

impl Role {
    /// Get the canonical string form of this role
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::providers::Role;
    ///
    /// assert_eq!(Role::User.as_str(), "user");
    /// assert_eq!(Role::Assistant.as_str(), "assistant");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a role from its canonical string form
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the role ("user" or "assistant")
    ///
    /// # Returns
    ///
    /// Returns the parsed Role or an error message if the string is invalid
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::providers::Role;
    ///
    /// let role = Role::parse_str("assistant").unwrap();
    /// assert_eq!(role, Role::Assistant);
    /// assert!(Role::parse_str("system").is_err());
    /// ```
    pub fn parse_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One prior exchange in a conversation, as replayed to the model
///
/// Turns carry only what the remote protocol needs: who spoke and what was
/// said. Persistence metadata (sequence position, timestamps) lives on
/// `storage::StoredMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn
    pub role: Role,
    /// Text content of the turn
    pub content: String,
}

impl Turn {
    /// Creates a new user turn
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::providers::{Role, Turn};
    ///
    /// let turn = Turn::user("Hello, assistant!");
    /// assert_eq!(turn.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant turn
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::providers::{Role, Turn};
    ///
    /// let turn = Turn::assistant("Hello, user!");
    /// assert_eq!(turn.role, Role::Assistant);
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazy, finite sequence of response text fragments
///
/// Produced by [`ModelClient::complete_streaming`]. Fragments arrive in order
/// and their concatenation equals the full response. The sequence terminates
/// normally on completion or yields a single `Generation` error mid-stream,
/// in which case fragments already delivered remain valid partial output.
/// Dropping the stream stops fragment delivery and releases the underlying
/// connection. The stream is not restartable.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Metadata about an available remote model
///
/// Returned by [`ModelClient::list_models`] for model discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier as accepted by the API (e.g. "gemini-2.5-flash")
    pub name: String,
    /// Display name for user-friendly presentation
    pub display_name: String,
    /// Short description of the model
    #[serde(default)]
    pub description: String,
    /// Generation methods the model supports (e.g. "generateContent")
    #[serde(default)]
    pub supported_methods: Vec<String>,
}

impl ModelEntry {
    /// Check whether this model supports a given generation method
    ///
    /// # Examples
    ///
    /// ```
    /// use kaiwa::providers::ModelEntry;
    ///
    /// let entry = ModelEntry {
    ///     name: "gemini-2.5-flash".to_string(),
    ///     display_name: "Gemini 2.5 Flash".to_string(),
    ///     description: String::new(),
    ///     supported_methods: vec!["generateContent".to_string()],
    /// };
    /// assert!(entry.supports_method("generateContent"));
    /// assert!(!entry.supports_method("embedContent"));
    /// ```
    pub fn supports_method(&self, method: &str) -> bool {
        self.supported_methods.iter().any(|m| m == method)
    }
}

/// Stateless adapter to a remote generative-language API
///
/// One instance is bound to an API credential and a model name. The adapter
/// holds no conversation state: history is always replayed by the caller.
/// It never retries and surfaces exactly one error per call. Empty or
/// filtered model output is not an error; operations return the empty string
/// and let the caller decide.
///
/// # Examples
///
/// ```no_run
/// use kaiwa::providers::{ModelClient, Turn};
/// use kaiwa::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoClient;
///
/// #[async_trait]
/// impl ModelClient for EchoClient {
///     async fn complete(&self, prompt: &str) -> Result<String> {
///         Ok(prompt.to_string())
///     }
///
///     async fn chat_turn(&self, _history: &[Turn], new_user_text: &str) -> Result<String> {
///         Ok(new_user_text.to_string())
///     }
///
///     fn current_model(&self) -> String {
///         "echo".to_string()
///     }
/// }
/// ```
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Single request/response completion with no history
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Generation` on network error, quota error,
    /// or malformed remote response
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Streaming completion with no history
    ///
    /// # Returns
    ///
    /// Returns a [`TextStream`] of response fragments
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Generation` if the request cannot be issued;
    /// mid-stream failures are yielded as the stream's final item
    ///
    /// # Default Implementation
    ///
    /// The default implementation returns an error indicating that
    /// streaming is not supported by this client.
    async fn complete_streaming(&self, _prompt: &str) -> Result<TextStream> {
        Err(crate::error::KaiwaError::Generation(
            "Streaming is not supported by this model client".to_string(),
        )
        .into())
    }

    /// History-seeded chat turn
    ///
    /// Replays `history` (ordered oldest first) into a fresh remote session
    /// and submits `new_user_text` as the next turn.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Generation` on network error, quota error,
    /// or malformed remote response
    async fn chat_turn(&self, history: &[Turn], new_user_text: &str) -> Result<String>;

    /// Ask the model for a concise conversation title
    ///
    /// The caller (not the adapter) enforces any length cap on the result.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Generation` on network error, quota error,
    /// or malformed remote response
    ///
    /// # Default Implementation
    ///
    /// The default implementation derives the title from a plain completion.
    async fn summarize_title(&self, seed_text: &str) -> Result<String> {
        let prompt = format!(
            "Reply with a concise title (a few words, no quotes, no punctuation) \
             for a conversation that starts with this message:\n\n{}",
            seed_text
        );
        self.complete(&prompt).await
    }

    /// List available models for this client
    ///
    /// # Errors
    ///
    /// Returns error if the client doesn't support model listing
    /// or if the API call fails
    ///
    /// # Default Implementation
    ///
    /// The default implementation returns an error indicating that
    /// model listing is not supported by this client.
    async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        Err(crate::error::KaiwaError::Generation(
            "Model listing is not supported by this model client".to_string(),
        )
        .into())
    }

    /// Get the name of the currently active model
    fn current_model(&self) -> String;

    /// Switch the active model
    ///
    /// The swap only affects subsequently-issued requests, never a request
    /// already in flight.
    ///
    /// # Default Implementation
    ///
    /// The default implementation ignores the switch; clients bound to a
    /// single fixed model may rely on it.
    fn set_model(&self, _model: &str) {}
}

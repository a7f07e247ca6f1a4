//! Kaiwa - Gemini chat assistant library
//!
//! This library provides the core functionality for the Kaiwa chat
//! assistant: the conversation session engine, the Gemini model client,
//! conversation persistence, and configuration.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session engine, per-conversation concurrency gate, and
//!   observer notifications
//! - `providers`: Remote model abstraction and the Gemini implementation
//! - `storage`: SQLite-backed persistence of conversations and messages
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kaiwa::config::GeminiConfig;
//! use kaiwa::providers::create_client;
//! use kaiwa::session::SessionEngine;
//! use kaiwa::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(SqliteStorage::new()?);
//!     let client = create_client(&GeminiConfig::default())?;
//!     let engine = SessionEngine::new(storage, client);
//!
//!     let conversation = engine.create_session(None)?;
//!     let mut events = engine.subscribe();
//!     engine.send_message(&conversation.id, "Hello!")?;
//!     println!("{:?}", events.recv().await?);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{KaiwaError, Result};
pub use providers::{GeminiClient, ModelClient, Role, Turn};
pub use session::{SessionEngine, SessionEvent, SessionState, DEFAULT_TITLE};
pub use storage::SqliteStorage;

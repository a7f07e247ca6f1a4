//! Model client module for Kaiwa
//!
//! This module contains the remote model abstraction and the Gemini
//! implementation.

pub mod base;
pub mod gemini;

pub use base::{ModelClient, ModelEntry, Role, TextStream, Turn};
pub use gemini::{GeminiClient, API_KEY_ENV};

use crate::config::GeminiConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a model client bound to the configured model
///
/// The API key is taken from the `GEMINI_API_KEY` environment variable.
///
/// # Arguments
///
/// * `config` - Gemini configuration (model, temperature, token limit)
///
/// # Returns
///
/// Returns a shared client instance
///
/// # Errors
///
/// Returns `KaiwaError::MissingCredentials` if no API key is available
pub fn create_client(config: &GeminiConfig) -> Result<Arc<dyn ModelClient>> {
    Ok(Arc::new(GeminiClient::from_env(config.clone())?))
}

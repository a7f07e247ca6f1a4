//! Command handlers for the Kaiwa CLI
//!
//! Each submodule implements one top-level CLI command. The handlers wire
//! the configuration into the storage, client, and engine layers and render
//! results for the terminal.

pub mod ask;
pub mod chat;
pub mod models;
pub mod sessions;

use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteStorage;

/// Open the conversation store configured for this invocation
pub(crate) fn open_storage(config: &Config) -> Result<SqliteStorage> {
    match &config.storage.path {
        Some(path) => SqliteStorage::new_with_path(path),
        None => SqliteStorage::new(),
    }
}

//! Command-line interface definition for Kaiwa
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot prompts, session
//! management, and model discovery.

use clap::{Parser, Subcommand};

/// Kaiwa - Gemini chat assistant
///
/// Hold named conversations with Gemini, persisted locally, with
/// history replay, streaming, and cancellable generations.
#[derive(Parser, Debug, Clone)]
#[command(name = "kaiwa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the model from config
    #[arg(short, long)]
    pub model: Option<String>,

    /// Override the conversation database path
    #[arg(long, env = "KAIWA_HISTORY_DB")]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Kaiwa
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume an existing conversation by id
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Send a single prompt and print the response
    Ask {
        /// The prompt to send
        prompt: String,

        /// Stream the response as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Manage stored conversations
    Sessions {
        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Manage Gemini models
    Models {
        /// Model management subcommand
        #[command(subcommand)]
        command: ModelCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List stored conversations
    List,

    /// Print the messages of a conversation
    Show {
        /// Conversation id
        id: String,
    },

    /// Delete a conversation and all its messages
    Delete {
        /// Conversation id
        id: String,
    },

    /// Rename a conversation
    Rename {
        /// Conversation id
        id: String,

        /// New title
        title: String,
    },
}

/// Model management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ModelCommand {
    /// List available generation models
    List,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

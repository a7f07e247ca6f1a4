//! Configuration management for Kaiwa
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{KaiwaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Kaiwa
///
/// This structure holds all configuration needed for the session engine:
/// model settings and the conversation store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gemini model configuration
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Conversation storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Gemini model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model to use for generation
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens per response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Optional API base URL (useful for tests and local mocks)
    ///
    /// When set, this base is used to build Gemini endpoints (e.g.
    /// `/models/<name>:generateContent`), which allows tests to point the
    /// client at a mock server.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            api_base: None,
        }
    }
}

/// Conversation storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path; defaults to the user's data directory
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file with CLI overrides applied
    ///
    /// A missing file is not an error: defaults are used, matching the
    /// behavior of running from a fresh checkout.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    /// * `cli` - Parsed command line arguments whose overrides take
    ///   precedence over the file
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Yaml` if the file exists but cannot be parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| KaiwaError::Config(format!("Failed to read {}: {}", path, e)))?;
            serde_yaml::from_str(&contents).map_err(KaiwaError::Yaml)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path);
            Self::default()
        };

        if let Some(model) = &cli.model {
            config.gemini.model = model.clone();
        }
        if let Some(storage_path) = &cli.storage_path {
            config.storage.path = Some(storage_path.clone());
        }

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.gemini.model.trim().is_empty() {
            return Err(KaiwaError::Config("gemini.model must not be empty".to_string()).into());
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(KaiwaError::Config(format!(
                "gemini.temperature must be between 0.0 and 2.0, got {}",
                self.gemini.temperature
            ))
            .into());
        }
        if self.gemini.max_output_tokens == 0 {
            return Err(
                KaiwaError::Config("gemini.max_output_tokens must be positive".to_string()).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands, SessionCommand};
    use clap::Parser;

    fn cli_with_args(args: &[&str]) -> Cli {
        let mut full = vec!["kaiwa"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    fn base_cli() -> Cli {
        Cli {
            config: None,
            verbose: false,
            model: None,
            storage_path: None,
            command: Commands::Sessions {
                command: SessionCommand::List,
            },
        }
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert!((config.gemini.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.gemini.max_output_tokens, 2048);
        assert!(config.gemini.api_base.is_none());
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/config.yaml", &base_cli()).unwrap();
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_load_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "gemini:\n  model: gemini-2.5-pro\n  temperature: 0.3\nstorage:\n  path: /tmp/x.db\n",
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap(), &base_cli()).unwrap();
        assert_eq!(config.gemini.model, "gemini-2.5-pro");
        assert!((config.gemini.temperature - 0.3).abs() < f64::EPSILON);
        // Unspecified fields fall back to defaults
        assert_eq!(config.gemini.max_output_tokens, 2048);
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/x.db"));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "gemini: [not a mapping").unwrap();

        assert!(Config::load(path.to_str().unwrap(), &base_cli()).is_err());
    }

    #[test]
    fn test_cli_model_override_wins() {
        let cli = cli_with_args(&["--model", "gemini-2.5-pro", "sessions", "list"]);
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        assert_eq!(config.gemini.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_cli_storage_path_override() {
        let cli = cli_with_args(&["--storage-path", "/tmp/override.db", "sessions", "list"]);
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/override.db"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = Config::default();
        config.gemini.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = Config::default();
        config.gemini.temperature = 2.5;
        assert!(config.validate().is_err());

        config.gemini.temperature = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_output_tokens() {
        let mut config = Config::default();
        config.gemini.max_output_tokens = 0;
        assert!(config.validate().is_err());
    }
}

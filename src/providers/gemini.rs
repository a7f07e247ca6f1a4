//! Gemini model client implementation for Kaiwa
//!
//! This module implements the ModelClient trait against the Google Gemini
//! REST API (`generateContent`, `streamGenerateContent`, model listing).
//! The adapter is stateless: conversation history is replayed on every chat
//! turn, and the only mutable state is the active model name, which can be
//! switched at runtime.

use crate::config::GeminiConfig;
use crate::error::{KaiwaError, Result};
use crate::providers::{ModelClient, ModelEntry, Role, TextStream, Turn};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default Gemini API base URL
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Gemini API client
///
/// Connects to the Gemini generative-language API to produce completions.
/// Supports single-shot completion, SSE streaming, history-seeded chat turns,
/// title summarization, and model listing. The model name can be switched at
/// runtime; the swap only affects subsequently-issued requests.
///
/// # Examples
///
/// ```no_run
/// use kaiwa::config::GeminiConfig;
/// use kaiwa::providers::{GeminiClient, ModelClient};
///
/// # async fn example() -> kaiwa::error::Result<()> {
/// let client = GeminiClient::new("api-key".to_string(), GeminiConfig::default())?;
/// let reply = client.complete("Hello!").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: Arc<RwLock<GeminiConfig>>,
}

/// Request body for generateContent / streamGenerateContent
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

/// One content block in the Gemini wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

/// One text part of a content block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Generation parameters sent with every request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

/// Response body from generateContent (and each SSE chunk)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// One response candidate
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Response from the model listing endpoint
#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelData>,
}

/// Model metadata in the Gemini wire format
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelData {
    name: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Translate a Kaiwa role into the Gemini role vocabulary
///
/// Gemini expects `"user"` for user turns and `"model"` for assistant turns.
fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Concatenate the text parts of the first candidate
///
/// Empty or filtered output (no candidates, no content) is not an error;
/// the result is the empty string and the caller decides what to do with it.
fn extract_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .concat()
        })
        .unwrap_or_default()
}

/// Drain complete SSE events from the accumulation buffer
///
/// Events are terminated by a blank line. Returns the `data:` payloads of
/// every complete event, leaving any trailing partial event in the buffer.
fn drain_sse_events(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    loop {
        let Some(boundary) = buffer.find("\n\n").or_else(|| buffer.find("\r\n\r\n")) else {
            break;
        };
        let sep_len = if buffer[boundary..].starts_with("\r\n\r\n") {
            4
        } else {
            2
        };
        let event: String = buffer.drain(..boundary + sep_len).collect();

        for line in event.lines() {
            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }
    }

    payloads
}

impl GeminiClient {
    /// Create a new Gemini client instance
    ///
    /// # Arguments
    ///
    /// * `api_key` - Gemini API key
    /// * `config` - Gemini configuration (model, temperature, token limit)
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::MissingCredentials` if the key is empty, or a
    /// generation error if HTTP client initialization fails
    pub fn new(api_key: String, config: GeminiConfig) -> Result<Self> {
        if api_key.is_empty() {
            return Err(KaiwaError::MissingCredentials(format!(
                "{} is not set",
                API_KEY_ENV
            ))
            .into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("kaiwa/0.2.0")
            .build()
            .map_err(|e| KaiwaError::Generation(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized Gemini client: model={}", config.model);

        Ok(Self {
            client,
            api_key,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Create a client with the API key taken from the environment
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::MissingCredentials` if `GEMINI_API_KEY` is unset
    /// or empty
    pub fn from_env(config: GeminiConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        Self::new(api_key, config)
    }

    /// Base URL for API endpoints
    ///
    /// Uses the configured override when present, which allows tests to
    /// point the client at a mock server.
    fn api_base(&self) -> String {
        self.config
            .read()
            .ok()
            .and_then(|config| config.api_base.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }

    /// Snapshot of (model, generation config) for one request
    ///
    /// Read once at call time so a concurrent model switch never affects a
    /// request already in flight.
    fn request_params(&self) -> (String, GenerationConfig) {
        let config = self.config.read().expect("gemini config lock poisoned");
        (
            config.model.clone(),
            GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        )
    }

    /// Build the request body for a history-seeded generation
    fn build_request(&self, history: &[Turn], new_user_text: &str) -> (String, GenerateRequest) {
        let (model, generation_config) = self.request_params();

        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: gemini_role(turn.role).to_string(),
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: gemini_role(Role::User).to_string(),
            parts: vec![Part {
                text: new_user_text.to_string(),
            }],
        });

        (
            model,
            GenerateRequest {
                contents,
                generation_config,
            },
        )
    }

    /// Issue a generateContent request and extract the response text
    async fn generate(&self, history: &[Turn], new_user_text: &str) -> Result<String> {
        let (model, request) = self.build_request(history, new_user_text);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base(),
            model,
            self.api_key
        );

        tracing::debug!(model = %model, turns = history.len(), "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| KaiwaError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("Gemini returned error {}: {}", status, error_text);
            return Err(KaiwaError::Generation(format!(
                "Gemini returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| KaiwaError::Generation(format!("Failed to parse response: {}", e)))?;

        Ok(extract_text(&body))
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(&[], prompt).await
    }

    async fn complete_streaming(&self, prompt: &str) -> Result<TextStream> {
        let (model, request) = self.build_request(&[], prompt);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.api_base(),
            model,
            self.api_key
        );

        tracing::debug!(model = %model, "Opening streaming generation");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| KaiwaError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(KaiwaError::Generation(format!(
                "Gemini returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<String>>();

        // The producer exits as soon as the receiver is dropped, which stops
        // fragment delivery and releases the connection.
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(KaiwaError::Generation(format!(
                            "Stream read failed: {}",
                            e
                        ))
                        .into()));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                for payload in drain_sse_events(&mut buffer) {
                    let fragment = match serde_json::from_str::<GenerateResponse>(&payload) {
                        Ok(event) => extract_text(&event),
                        Err(e) => {
                            let _ = tx.send(Err(KaiwaError::Generation(format!(
                                "Malformed stream event: {}",
                                e
                            ))
                            .into()));
                            return;
                        }
                    };

                    if !fragment.is_empty() && tx.send(Ok(fragment)).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn chat_turn(&self, history: &[Turn], new_user_text: &str) -> Result<String> {
        self.generate(history, new_user_text).await
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>> {
        let url = format!("{}/models?key={}", self.api_base(), self.api_key);

        tracing::debug!("Fetching models from Gemini");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KaiwaError::Generation(format!("Failed to fetch models: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(KaiwaError::Generation(format!(
                "Gemini returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: ListModelsResponse = response
            .json()
            .await
            .map_err(|e| KaiwaError::Generation(format!("Failed to parse model list: {}", e)))?;

        // Only generation-capable models are useful here; embedding and
        // token-counting-only models are filtered out.
        let models = body
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| ModelEntry {
                name: m
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&m.name)
                    .to_string(),
                display_name: m.display_name,
                description: m.description,
                supported_methods: m.supported_generation_methods,
            })
            .collect();

        Ok(models)
    }

    fn current_model(&self) -> String {
        self.config
            .read()
            .map(|config| config.model.clone())
            .unwrap_or_default()
    }

    fn set_model(&self, model: &str) {
        if let Ok(mut config) = self.config.write() {
            tracing::info!("Switching Gemini model: {} -> {}", config.model, model);
            config.model = model.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> GeminiClient {
        GeminiClient::new("test-key".to_string(), GeminiConfig::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_api_key() {
        let result = GeminiClient::new(String::new(), GeminiConfig::default());
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KaiwaError>(),
            Some(KaiwaError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_gemini_role_translation() {
        assert_eq!(gemini_role(Role::User), "user");
        assert_eq!(gemini_role(Role::Assistant), "model");
    }

    #[test]
    fn test_build_request_appends_new_user_turn() {
        let client = test_client();
        let history = vec![Turn::user("Hello"), Turn::assistant("Hi there")];

        let (_, request) = client.build_request(&history, "How are you?");

        assert_eq!(request.contents.len(), 3);
        assert_eq!(request.contents[0].role, "user");
        assert_eq!(request.contents[1].role, "model");
        assert_eq!(request.contents[2].role, "user");
        assert_eq!(request.contents[2].parts[0].text, "How are you?");
    }

    #[test]
    fn test_build_request_serializes_camel_case() {
        let client = test_client();
        let (_, request) = client.build_request(&[], "hi");

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"maxOutputTokens\""));
        assert!(json.contains("\"temperature\""));
    }

    #[test]
    fn test_extract_text_concatenates_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"role": "model",
                "parts": [{"text": "Hello"}, {"text": " world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&response), "Hello world");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(extract_text(&response), "");

        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_text(&response), "");
    }

    #[test]
    fn test_extract_text_missing_content() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{}]}"#).unwrap();
        assert_eq!(extract_text(&response), "");
    }

    #[test]
    fn test_drain_sse_events_complete_event() {
        let mut buffer = "data: {\"a\": 1}\n\n".to_string();
        let payloads = drain_sse_events(&mut buffer);
        assert_eq!(payloads, vec!["{\"a\": 1}"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_sse_events_partial_event_left_in_buffer() {
        let mut buffer = "data: {\"a\": 1}\n\ndata: {\"b\"".to_string();
        let payloads = drain_sse_events(&mut buffer);
        assert_eq!(payloads, vec!["{\"a\": 1}"]);
        assert_eq!(buffer, "data: {\"b\"");
    }

    #[test]
    fn test_drain_sse_events_crlf_boundaries() {
        let mut buffer = "data: one\r\n\r\ndata: two\r\n\r\n".to_string();
        let payloads = drain_sse_events(&mut buffer);
        assert_eq!(payloads, vec!["one", "two"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_sse_events_multiple_in_one_chunk() {
        let mut buffer = "data: a\n\ndata: b\n\ndata: c\n\n".to_string();
        let payloads = drain_sse_events(&mut buffer);
        assert_eq!(payloads, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_current_model_and_set_model() {
        let client = test_client();
        assert_eq!(client.current_model(), "gemini-2.5-flash");

        client.set_model("gemini-2.5-pro");
        assert_eq!(client.current_model(), "gemini-2.5-pro");
    }

    #[test]
    fn test_api_base_default_and_override() {
        let client = test_client();
        assert_eq!(client.api_base(), DEFAULT_API_BASE);

        let config = GeminiConfig {
            api_base: Some("http://localhost:9999/v1beta".to_string()),
            ..GeminiConfig::default()
        };
        let client = GeminiClient::new("test-key".to_string(), config).unwrap();
        assert_eq!(client.api_base(), "http://localhost:9999/v1beta");
    }

    #[test]
    fn test_model_list_parses_wire_format() {
        let body: ListModelsResponse = serde_json::from_str(
            r#"{"models": [
                {"name": "models/gemini-2.5-flash",
                 "displayName": "Gemini 2.5 Flash",
                 "description": "Fast model",
                 "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/embedding-001",
                 "displayName": "Embedding 001",
                 "supportedGenerationMethods": ["embedContent"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.models.len(), 2);
        assert_eq!(body.models[0].display_name, "Gemini 2.5 Flash");
    }
}

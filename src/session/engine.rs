//! Conversation session engine
//!
//! The engine owns conversation/message state, drives generation cycles
//! against the model client, and enforces the concurrency discipline that
//! keeps exactly one generation in flight per conversation. Observers watch
//! progress through a broadcast channel and may cancel at any time.

use crate::error::{KaiwaError, Result};
use crate::providers::{ModelClient, Role, Turn};
use crate::session::SessionEvent;
use crate::storage::{Conversation, ConversationSummary, SqliteStorage, StoredMessage};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Sentinel title assigned to conversations at creation
pub const DEFAULT_TITLE: &str = "New Chat";

/// Character position where inferred titles are cut
const TITLE_TRUNCATE_AT: usize = 27;

/// Marker appended to truncated titles
const TITLE_ELLIPSIS: &str = "...";

/// Capacity of the observer notification channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Generation state of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No generation in flight
    #[default]
    Idle,
    /// A generation is in flight; further sends are rejected with `Busy`
    Generating,
    /// A cancellation is being propagated into the in-flight call
    Cancelling,
}

/// Per-conversation concurrency gate
///
/// `generation` is a monotonically incrementing counter captured by each
/// spawned generation task and compared at result-delivery time; a mismatch
/// means the request was cancelled (or superseded) and its result must be
/// dropped, never applied.
#[derive(Debug, Default)]
struct Gate {
    state: SessionState,
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Orchestrates conversation persistence and remote generation calls
///
/// Safe for concurrent invocation from multiple tasks. The only blocking
/// operation is the remote generation call itself, which runs on a spawned
/// task and reports back through the event channel rather than blocking the
/// caller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use kaiwa::providers::create_client;
/// use kaiwa::session::SessionEngine;
/// use kaiwa::storage::SqliteStorage;
/// use kaiwa::config::GeminiConfig;
///
/// # async fn example() -> kaiwa::error::Result<()> {
/// let storage = Arc::new(SqliteStorage::new()?);
/// let client = create_client(&GeminiConfig::default())?;
/// let engine = SessionEngine::new(storage, client);
///
/// let mut events = engine.subscribe();
/// let conversation = engine.create_session(None)?;
/// engine.send_message(&conversation.id, "Hello!")?;
/// let outcome = events.recv().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionEngine {
    storage: Arc<SqliteStorage>,
    client: RwLock<Arc<dyn ModelClient>>,
    gates: Arc<Mutex<HashMap<String, Gate>>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Truncate an inferred title to the display cap
///
/// Titles longer than the cap are cut at character 27 and terminated with
/// an ellipsis marker, giving exactly 30 characters. Counts characters,
/// not bytes, so multi-byte titles are never split mid-character.
fn truncate_title(title: &str) -> String {
    let chars: Vec<char> = title.chars().collect();
    if chars.len() > TITLE_TRUNCATE_AT {
        let mut truncated: String = chars[..TITLE_TRUNCATE_AT].iter().collect();
        truncated.push_str(TITLE_ELLIPSIS);
        truncated
    } else {
        title.to_string()
    }
}

impl SessionEngine {
    /// Create a new session engine over a store and a model client
    pub fn new(storage: Arc<SqliteStorage>, client: Arc<dyn ModelClient>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            client: RwLock::new(client),
            gates: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Subscribe to session notifications
    ///
    /// Each receiver sees every event emitted after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Swap the model client
    ///
    /// The swap only affects subsequently-issued requests; a request already
    /// in flight keeps the client it captured.
    pub fn set_client(&self, client: Arc<dyn ModelClient>) {
        *self.client.write().expect("client lock poisoned") = client;
    }

    /// Switch the active model on the current client
    pub fn set_model(&self, model: &str) {
        self.client
            .read()
            .expect("client lock poisoned")
            .set_model(model);
    }

    /// Name of the currently active model
    pub fn current_model(&self) -> String {
        self.client
            .read()
            .expect("client lock poisoned")
            .current_model()
    }

    /// Snapshot of the client for one generation
    fn client(&self) -> Arc<dyn ModelClient> {
        self.client.read().expect("client lock poisoned").clone()
    }

    /// Create a new conversation with a fresh id
    ///
    /// # Arguments
    ///
    /// * `title` - Optional title; defaults to [`DEFAULT_TITLE`]
    ///
    /// # Returns
    ///
    /// Returns the persisted conversation, in `Idle` state
    pub fn create_session(&self, title: Option<&str>) -> Result<Conversation> {
        let id = Uuid::new_v4().to_string();
        let conversation = self
            .storage
            .create_conversation(&id, title.unwrap_or(DEFAULT_TITLE))?;
        tracing::info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// List all conversations, most-recently-updated first
    pub fn list_sessions(&self) -> Result<Vec<ConversationSummary>> {
        self.storage.list_conversations()
    }

    /// List the messages of a conversation in order
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        self.storage.list_messages(conversation_id)
    }

    /// Rename a conversation
    pub fn rename_session(&self, conversation_id: &str, title: &str) -> Result<()> {
        self.storage.rename_conversation(conversation_id, title)
    }

    /// Delete a conversation and all its messages
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Busy` if a generation is in flight, or
    /// `KaiwaError::NotFound` for an unknown id
    pub fn delete_session(&self, conversation_id: &str) -> Result<()> {
        let mut gates = self.gates.lock().expect("gate lock poisoned");
        let state = gates
            .get(conversation_id)
            .map(|gate| gate.state)
            .unwrap_or_default();
        if state != SessionState::Idle {
            return Err(KaiwaError::Busy(conversation_id.to_string()).into());
        }

        // Holding the gate lock across the delete keeps a concurrent send
        // from starting against a half-deleted conversation.
        self.storage.delete_conversation(conversation_id)?;
        gates.remove(conversation_id);
        tracing::info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    /// Generation state of a conversation
    pub fn state(&self, conversation_id: &str) -> SessionState {
        self.gates
            .lock()
            .expect("gate lock poisoned")
            .get(conversation_id)
            .map(|gate| gate.state)
            .unwrap_or_default()
    }

    /// Send a user message and start a generation
    ///
    /// Persists the user turn, emits `Started`, and spawns the generation
    /// task. The call never waits for the remote model: the outcome arrives
    /// as a `Succeeded` or `Failed` event.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Busy` immediately if a generation is already in
    /// flight for this conversation, `KaiwaError::NotFound` for an unknown
    /// id, or `KaiwaError::Storage` if the user turn cannot be persisted
    /// (in which case nothing was started)
    pub fn send_message(&self, conversation_id: &str, text: &str) -> Result<()> {
        let (generation, cancel) = self.acquire_gate(conversation_id)?;

        if let Err(e) = self
            .storage
            .append_message(conversation_id, Role::User, text)
        {
            self.release_gate(conversation_id);
            return Err(e);
        }

        let _ = self.events.send(SessionEvent::Started {
            conversation_id: conversation_id.to_string(),
        });
        self.spawn_generation(conversation_id.to_string(), generation, cancel);
        Ok(())
    }

    /// Re-issue the generation for the last persisted user turn
    ///
    /// Used after a failed send: the user turn is already persisted, so the
    /// call is re-issued without duplicating it.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Busy` if a generation is in flight,
    /// `KaiwaError::NotFound` for an unknown id, or
    /// `KaiwaError::NothingToRetry` if the conversation is empty or its
    /// last message already has an assistant reply
    pub fn retry_last(&self, conversation_id: &str) -> Result<()> {
        let (generation, cancel) = self.acquire_gate(conversation_id)?;

        let messages = match self.storage.list_messages(conversation_id) {
            Ok(messages) => messages,
            Err(e) => {
                self.release_gate(conversation_id);
                return Err(e);
            }
        };

        match messages.last() {
            Some(last) if last.role == Role::User => {}
            _ => {
                self.release_gate(conversation_id);
                return Err(KaiwaError::NothingToRetry(conversation_id.to_string()).into());
            }
        }

        let _ = self.events.send(SessionEvent::Started {
            conversation_id: conversation_id.to_string(),
        });
        self.spawn_generation(conversation_id.to_string(), generation, cancel);
        Ok(())
    }

    /// Cancel the in-flight generation of a conversation
    ///
    /// Propagates cancellation into the model call and immediately returns
    /// the conversation to `Idle` so the caller can act again. If the remote
    /// call cannot be interrupted it is detached: a late result is dropped
    /// by the generation-token check, never applied. No terminal
    /// notification is emitted for the cancelled request.
    ///
    /// # Returns
    ///
    /// Returns true if a generation was cancelled, false if the
    /// conversation was not generating
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let mut gates = self.gates.lock().expect("gate lock poisoned");
        let Some(gate) = gates.get_mut(conversation_id) else {
            return false;
        };
        if gate.state != SessionState::Generating {
            return false;
        }

        gate.state = SessionState::Cancelling;
        if let Some(token) = gate.cancel.take() {
            token.cancel();
        }
        // Invalidate the in-flight request's captured token so a detached
        // result cannot be applied to a conversation that has moved on.
        gate.generation += 1;
        gate.state = SessionState::Idle;

        tracing::info!("Cancelled generation for conversation {}", conversation_id);
        true
    }

    /// Acquire the per-conversation gate, non-blocking
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Busy` immediately if the gate is held
    fn acquire_gate(&self, conversation_id: &str) -> Result<(u64, CancellationToken)> {
        let mut gates = self.gates.lock().expect("gate lock poisoned");
        let gate = gates.entry(conversation_id.to_string()).or_default();
        if gate.state != SessionState::Idle {
            return Err(KaiwaError::Busy(conversation_id.to_string()).into());
        }

        gate.state = SessionState::Generating;
        gate.generation += 1;
        let token = CancellationToken::new();
        gate.cancel = Some(token.clone());
        Ok((gate.generation, token))
    }

    /// Return a conversation's gate to `Idle` after a failed start
    fn release_gate(&self, conversation_id: &str) {
        let mut gates = self.gates.lock().expect("gate lock poisoned");
        if let Some(gate) = gates.get_mut(conversation_id) {
            gate.state = SessionState::Idle;
            gate.cancel = None;
        }
    }

    /// Spawn the generation task for an acquired gate
    ///
    /// The task replays the persisted history through the model client and
    /// delivers the result under the gate lock, where the captured
    /// generation token is compared against the gate's current one: stale
    /// results are dropped.
    fn spawn_generation(&self, conversation_id: String, generation: u64, cancel: CancellationToken) {
        let storage = Arc::clone(&self.storage);
        let gates = Arc::clone(&self.gates);
        let events = self.events.clone();
        let client = self.client();

        tokio::spawn(async move {
            let outcome = match storage.list_messages(&conversation_id) {
                Err(e) => Err(e),
                Ok(messages) => {
                    let Some((last, prior)) = messages.split_last() else {
                        tracing::warn!(
                            "Generation task found no messages for {}",
                            conversation_id
                        );
                        return;
                    };
                    let history: Vec<Turn> = prior
                        .iter()
                        .map(|m| Turn {
                            role: m.role,
                            content: m.content.clone(),
                        })
                        .collect();
                    let first_user_text = messages
                        .first()
                        .map(|m| m.content.clone())
                        .unwrap_or_default();

                    let result = tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!(
                                "Generation for {} cancelled in flight",
                                conversation_id
                            );
                            return;
                        }
                        result = client.chat_turn(&history, &last.content) => result,
                    };
                    result.map(|text| (text, first_user_text))
                }
            };

            // Result delivery: the gate lock makes the token check and the
            // assistant append atomic with respect to cancel().
            let mut inferred_seed: Option<String> = None;
            let event = {
                let mut gates = gates.lock().expect("gate lock poisoned");
                let Some(gate) = gates.get_mut(&conversation_id) else {
                    return;
                };
                if gate.generation != generation {
                    tracing::debug!(
                        "Dropping stale generation result for {}",
                        conversation_id
                    );
                    return;
                }

                gate.state = SessionState::Idle;
                gate.cancel = None;

                match outcome {
                    Ok((text, first_user_text)) => {
                        match storage.append_message(&conversation_id, Role::Assistant, &text) {
                            Ok(_) => {
                                inferred_seed = Some(first_user_text);
                                SessionEvent::Succeeded {
                                    conversation_id: conversation_id.clone(),
                                    text,
                                }
                            }
                            Err(e) => SessionEvent::Failed {
                                conversation_id: conversation_id.clone(),
                                error: e.to_string(),
                            },
                        }
                    }
                    Err(e) => SessionEvent::Failed {
                        conversation_id: conversation_id.clone(),
                        error: e.to_string(),
                    },
                }
            };
            let _ = events.send(event);

            if let Some(seed) = inferred_seed {
                Self::maybe_infer_title(storage, client, conversation_id, seed).await;
            }
        });
    }

    /// Infer and persist a title after a successful reply
    ///
    /// Runs only while the conversation still holds its default title.
    /// Inference never blocks or fails the send flow: errors and empty
    /// output are logged and swallowed, leaving the title unchanged.
    async fn maybe_infer_title(
        storage: Arc<SqliteStorage>,
        client: Arc<dyn ModelClient>,
        conversation_id: String,
        seed_text: String,
    ) {
        match storage.get_conversation(&conversation_id) {
            Ok(conversation) if conversation.title == DEFAULT_TITLE => {}
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(
                    "Skipping title inference for {}: {}",
                    conversation_id,
                    e
                );
                return;
            }
        }

        match client.summarize_title(&seed_text).await {
            Ok(title) => {
                let title = title.trim();
                if title.is_empty() {
                    tracing::debug!(
                        "Title inference returned empty output for {}",
                        conversation_id
                    );
                    return;
                }
                let title = truncate_title(title);
                if let Err(e) = storage.rename_conversation(&conversation_id, &title) {
                    tracing::warn!(
                        "Failed to persist inferred title for {}: {}",
                        conversation_id,
                        e
                    );
                } else {
                    tracing::info!("Inferred title for {}: {}", conversation_id, title);
                }
            }
            Err(e) => {
                tracing::warn!("Title inference failed for {}: {}", conversation_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title_short_titles_untouched() {
        assert_eq!(truncate_title("Weather in Tokyo"), "Weather in Tokyo");
        assert_eq!(truncate_title(""), "");
    }

    #[test]
    fn test_truncate_title_boundary() {
        let exactly_27 = "a".repeat(27);
        assert_eq!(truncate_title(&exactly_27), exactly_27);

        let over = "a".repeat(28);
        let truncated = truncate_title(&over);
        assert_eq!(truncated.chars().count(), 30);
        assert!(truncated.ends_with("..."));
        assert!(truncated.starts_with(&"a".repeat(27)));
    }

    #[test]
    fn test_truncate_title_counts_characters_not_bytes() {
        let title = "天".repeat(40);
        let truncated = truncate_title(&title);
        assert_eq!(truncated.chars().count(), 30);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_session_state_defaults_to_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }
}

//! Observer notifications emitted by the session engine

/// Notification delivered to session observers
///
/// Every accepted `send_message`/`retry_last` emits `Started` promptly, then
/// exactly one terminal notification (`Succeeded` or `Failed`) unless the
/// request is cancelled, in which case no terminal notification follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A generation has been accepted and is now in flight
    Started {
        /// Conversation the generation belongs to
        conversation_id: String,
    },
    /// The generation completed and the assistant turn was persisted
    Succeeded {
        /// Conversation the generation belongs to
        conversation_id: String,
        /// The assistant's reply text
        text: String,
    },
    /// The generation (or the persistence of its result) failed
    ///
    /// The user turn remains persisted; the conversation is back in `Idle`
    /// and accepts a retry.
    Failed {
        /// Conversation the generation belongs to
        conversation_id: String,
        /// Human-readable failure description
        error: String,
    },
}

impl SessionEvent {
    /// Conversation id this event refers to
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Started { conversation_id }
            | Self::Succeeded {
                conversation_id, ..
            }
            | Self::Failed {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_accessor() {
        let started = SessionEvent::Started {
            conversation_id: "conv-1".to_string(),
        };
        let succeeded = SessionEvent::Succeeded {
            conversation_id: "conv-2".to_string(),
            text: "hi".to_string(),
        };
        let failed = SessionEvent::Failed {
            conversation_id: "conv-3".to_string(),
            error: "boom".to_string(),
        };

        assert_eq!(started.conversation_id(), "conv-1");
        assert_eq!(succeeded.conversation_id(), "conv-2");
        assert_eq!(failed.conversation_id(), "conv-3");
    }
}

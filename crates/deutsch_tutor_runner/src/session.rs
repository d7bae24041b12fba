use deutsch_tutor::{parse_reply, Conversation, PromptBuilder, StructuredReply, Turn};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::{LlmError, ModelBackend};

/// Shown as the agent's reply when the backend could not be reached.
pub const BACKEND_ERROR_REPLY: &str = "Fehler: Konnte Ollama nicht erreichen.";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no conversation history yet")]
    NoHistory,
    #[error(transparent)]
    Backend(#[from] LlmError),
}

/// One user's conversation. Each handler borrows it explicitly; there is no
/// shared state between sessions.
#[derive(Debug, Clone, Default)]
pub struct Session {
    conversation: Conversation,
    prompt: PromptBuilder,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt_builder(prompt: PromptBuilder) -> Self {
        Self {
            conversation: Conversation::new(),
            prompt,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &[Turn] {
        self.conversation.turns()
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.conversation.append_turn(turn);
    }

    pub fn reset(&mut self) {
        self.conversation.reset();
    }

    /// Runs one exchange: build the prompt, call the backend, parse the
    /// reply and append the turn.
    ///
    /// Backend failures do not surface as errors. The turn is still recorded,
    /// with [`BACKEND_ERROR_REPLY`] as its reply.
    pub async fn send(&mut self, backend: &ModelBackend, message: &str) -> Result<Turn, SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let prompt = self.prompt.build(self.conversation.turns(), message);
        let parsed = match backend.generate(&prompt).await {
            Ok(raw) => {
                debug!(backend = backend.name(), raw_chars = raw.len(), "model replied");
                parse_reply(&raw)
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "model backend failed");
                StructuredReply::reply_only(BACKEND_ERROR_REPLY)
            }
        };

        let turn = Turn::new(message, parsed);
        self.append_turn(turn.clone());
        Ok(turn)
    }

    /// Re-asks the backend for the last turn and returns the unparsed text.
    ///
    /// The prompt is rebuilt from every turn but the last, plus the last
    /// turn's message. Nothing is cached or appended.
    pub async fn debug_raw(&self, backend: &ModelBackend) -> Result<String, SessionError> {
        let Some((last, earlier)) = self.conversation.turns().split_last() else {
            return Err(SessionError::NoHistory);
        };
        let prompt = self.prompt.build(earlier, &last.user);
        Ok(backend.generate(&prompt).await?)
    }
}

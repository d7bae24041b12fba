use serde::{Deserialize, Serialize};

/// The three fields extracted from one model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredReply {
    pub correction: String,
    pub explanation: String,
    pub reply: String,
}

impl StructuredReply {
    /// A reply that carries only conversational text, e.g. a backend error sentence.
    pub fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.correction.is_empty() && self.explanation.is_empty() && self.reply.is_empty()
    }
}

/// One exchange: what the user wrote and what the model made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub correction: String,
    pub explanation: String,
    pub reply: String,
}

impl Turn {
    pub fn new(user: &str, parsed: StructuredReply) -> Self {
        Self {
            user: user.trim().to_string(),
            correction: parsed.correction,
            explanation: parsed.explanation,
            reply: parsed.reply,
        }
    }
}

/// Ordered turns of one session. Insertion order is both display order and
/// the order in which turns are replayed into later prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent `k` turns, oldest first.
    pub fn window(&self, k: usize) -> &[Turn] {
        window(&self.turns, k)
    }
}

pub(crate) fn window(turns: &[Turn], k: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(k)..]
}

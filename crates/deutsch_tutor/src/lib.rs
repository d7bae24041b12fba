//! Prompt construction and reply parsing for a German conversation partner.
//!
//! The model is asked to answer in a fixed three-field template
//! (`KORREKTUR` / `ERKLÄRUNG` / `ANTWORT`). [`prompt::PromptBuilder`] sets up
//! that contract and folds a bounded window of earlier turns into the prompt;
//! [`reply_parser::parse_reply`] decomposes whatever the model sent back.

pub mod prompt;
pub mod reply_parser;
pub mod turn;

pub use prompt::{build_prompt, PromptBuilder, MAX_HISTORY_TURNS};
pub use reply_parser::parse_reply;
pub use turn::{Conversation, StructuredReply, Turn};

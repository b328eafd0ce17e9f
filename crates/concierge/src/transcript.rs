//! Conversion of chat widget history into agent messages.
//!
//! The widget reports prior turns in one of two shapes: role/content records
//! (`{"role": "user", "content": "hi"}`) or turn pairs (`["hi", "hello"]`) where the
//! assistant half is missing while a reply is still in progress.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::message::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationTurn {
    Record {
        role: String,
        #[serde(default)]
        content: String,
    },
    Pair(String, Option<String>),
}

impl ConversationTurn {
    pub fn user<S: Into<String>>(content: S) -> Self {
        ConversationTurn::Record {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        ConversationTurn::Record {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Parse one history element, returning `None` for shapes we don't understand
    pub fn from_value(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(turn) => Some(turn),
            Err(e) => {
                tracing::debug!(%value, "skipping malformed history entry: {e}");
                None
            }
        }
    }
}

/// Parse a raw history array, dropping malformed elements
pub fn turns_from_values(values: &[Value]) -> Vec<ConversationTurn> {
    values
        .iter()
        .filter_map(ConversationTurn::from_value)
        .collect()
}

/// Convert prior turns into user and assistant messages, preserving order
pub fn to_messages(history: &[ConversationTurn]) -> Vec<Message> {
    let mut messages = Vec::new();

    for turn in history {
        match turn {
            ConversationTurn::Record { role, content } => match role.as_str() {
                "user" => messages.push(Message::user().with_text(content)),
                "assistant" => messages.push(Message::assistant().with_text(content)),
                _ => {}
            },
            ConversationTurn::Pair(user, assistant) => {
                messages.push(Message::user().with_text(user));
                if let Some(assistant) = assistant.as_deref().filter(|a| !a.is_empty()) {
                    messages.push(Message::assistant().with_text(assistant));
                }
            }
        }
    }

    messages
}

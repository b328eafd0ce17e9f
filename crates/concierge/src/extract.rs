use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::message::Message;
use crate::models::role::Role;

pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response.";

/// The shapes an agent loop result can arrive in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResponse {
    /// A state mapping carrying the full message list
    Conversation { messages: Vec<Message> },
    /// A bare message list
    Messages(Vec<Message>),
    /// Anything else; kept so it can be reported
    Unrecognized(Value),
}

impl AgentResponse {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or(AgentResponse::Unrecognized(value))
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            AgentResponse::Conversation { messages } | AgentResponse::Messages(messages) => {
                messages
            }
            AgentResponse::Unrecognized(value) => {
                tracing::warn!(%value, "unrecognized agent response shape");
                &[]
            }
        }
    }
}

impl From<Vec<Message>> for AgentResponse {
    fn from(messages: Vec<Message>) -> Self {
        AgentResponse::Conversation { messages }
    }
}

/// The text of the most recent assistant message with any text in it
pub fn extract_reply(response: &AgentResponse) -> String {
    response
        .messages()
        .iter()
        .rev()
        .filter(|message| message.role == Role::Assistant)
        .map(Message::text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| FALLBACK_REPLY.to_string())
}

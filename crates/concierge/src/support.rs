use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

use crate::errors::ChatError;
use crate::extract::extract_reply;
use crate::models::message::Message;
use crate::prompt_template::{system_prompt, SupportPrompt};
use crate::providers::configs::OpenAiProviderConfig;
use crate::providers::openai::OpenAiProvider;
use crate::responder::{Responder, ToolAugmentedResponder};
use crate::systems::McpToolSource;
use crate::transcript::{to_messages, ConversationTurn};

/// The result of one chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChatOutcome {
    /// The input was empty, nothing was sent
    Skipped,
    Reply { text: String },
    Failed { error: ChatError },
}

impl ChatOutcome {
    /// The string shown in the chat transcript
    pub fn render(&self) -> String {
        match self {
            ChatOutcome::Skipped => String::new(),
            ChatOutcome::Reply { text } => text.clone(),
            ChatOutcome::Failed { error } => format!("I encountered an error: {error}"),
        }
    }
}

/// Customer support assistant: turns one user message plus the prior transcript into a reply
pub struct SupportAgent {
    responder: Arc<dyn Responder>,
    prompt: SupportPrompt,
}

impl SupportAgent {
    pub fn new(responder: Arc<dyn Responder>) -> Self {
        Self {
            responder,
            prompt: SupportPrompt::default(),
        }
    }

    /// Wire an OpenAI model to the tools served at the given MCP endpoint
    pub fn from_config(provider: OpenAiProviderConfig, tools: McpToolSource) -> Result<Self> {
        let provider = OpenAiProvider::new(provider)?;
        let responder = ToolAugmentedResponder::new(Arc::new(provider), Box::new(tools));
        Ok(Self::new(Arc::new(responder)))
    }

    /// Fetch the tools and bind the agent ahead of the first turn
    pub async fn initialize(&self) -> Result<()> {
        self.responder.initialize().await
    }

    pub async fn chat(&self, message: &str, history: &[ConversationTurn]) -> ChatOutcome {
        if message.trim().is_empty() {
            return ChatOutcome::Skipped;
        }

        let span = tracing::info_span!("chat_turn", history = history.len());
        async {
            match self.turn(message, history).await {
                Ok(text) => ChatOutcome::Reply { text },
                Err(err) => {
                    tracing::error!("chat turn failed: {err:#}");
                    ChatOutcome::Failed {
                        error: ChatError::from(err),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn turn(&self, message: &str, history: &[ConversationTurn]) -> Result<String> {
        self.responder.initialize().await?;

        let messages = self.assemble(message, history)?;
        tracing::debug!(messages = messages.len(), "sending turn to responder");

        let response = self.responder.respond(messages).await?;
        Ok(extract_reply(&response))
    }

    /// System prompt, then the adapted history, then the new user message
    fn assemble(&self, message: &str, history: &[ConversationTurn]) -> Result<Vec<Message>> {
        let mut messages = vec![Message::system().with_text(system_prompt(&self.prompt)?)];
        messages.extend(to_messages(history));
        messages.push(Message::user().with_text(message));
        Ok(messages)
    }
}

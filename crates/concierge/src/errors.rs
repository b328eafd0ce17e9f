use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::errors::ProviderError;

/// Errors produced while dispatching a single tool call. These are fed back to the
/// model as tool results rather than aborting the turn.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Raised when the responder cannot be brought up: the tool list could not be fetched
/// from the remote provider, or the agent loop could not be bound to it.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct SetupError {
    message: String,
    #[source]
    source: anyhow::Error,
}

impl SetupError {
    pub fn new<S: Into<String>>(message: S, source: anyhow::Error) -> Self {
        Self {
            message: message.into(),
            source,
        }
    }
}

/// A failed chat turn, classified by where it went wrong.
///
/// The display form is the raw error text; callers that want the apology wording
/// should go through [`crate::ChatOutcome::render`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ChatError {
    #[error("{0}")]
    Setup(String),

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Internal(String),
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Setup(_) => "setup",
            ChatError::Provider(_) => "provider",
            ChatError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        if err.downcast_ref::<SetupError>().is_some() {
            ChatError::Setup(message)
        } else if err.downcast_ref::<ProviderError>().is_some() {
            ChatError::Provider(message)
        } else {
            ChatError::Internal(message)
        }
    }
}

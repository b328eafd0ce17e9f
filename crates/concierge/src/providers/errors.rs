use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the hosted language model
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request to the model provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    ServerError(StatusCode),

    #[error("Request failed: {status}\nPayload: {payload}")]
    RequestFailed { status: StatusCode, payload: String },

    #[error("OpenAI API error: {0}")]
    Api(String),

    #[error("Context length exceeded. Message: {0}")]
    ContextLengthExceeded(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

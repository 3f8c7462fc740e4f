//! Completion provider abstraction and the OpenAI chat-completions client.
//!
//! The bridge sends one user message per completion; no history, no tools.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;

/// One prompt. `model` falls back to the client's configured default when None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub text: String,
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    /// Model the provider reports having used.
    pub model: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion response had no choices")]
    EmptyChoices,
    #[error("completion choice had no text content")]
    NoContent,
    #[error("completion timed out")]
    Timeout,
    #[error("completion api key not configured")]
    NoApiKey,
}

impl CompletionError {
    /// Failures worth a redelivery: transport problems, timeouts, throttling, provider 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Timeout => true,
            CompletionError::EmptyChoices
            | CompletionError::NoContent
            | CompletionError::NoApiKey => false,
        }
    }
}

/// Maps a prompt to a completion via an external provider. No retries.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, CompletionError>;
}

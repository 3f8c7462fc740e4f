//! OpenAI chat completions client (`POST {base}/chat/completions`).
//!
//! Also works against OpenAI-compatible servers (LM Studio, vLLM, ...) through the base URL.

use crate::llm::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            api_key,
            default_model: default_model.into(),
            client,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// POST /chat/completions: single user message, non-streaming.
    async fn chat(&self, model: &str, text: &str) -> Result<OpenAiChatResponse, CompletionError> {
        let api_key = self.api_key.as_ref().ok_or(CompletionError::NoApiKey)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model,
            messages: vec![OpenAiMessage {
                role: "user",
                content: text,
            }],
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Request(e)
                }
            })?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let model = req.model.as_deref().unwrap_or(&self.default_model);
        log::debug!("completion: model {}", model);
        let data = self.chat(model, &req.text).await?;
        first_choice(data)
    }
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

/// `choices[0].message.content`. No choices, no message, or null/blank content is an error.
fn first_choice(data: OpenAiChatResponse) -> Result<CompletionResponse, CompletionError> {
    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or(CompletionError::EmptyChoices)?;
    let text = choice
        .message
        .and_then(|m| m.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(CompletionError::NoContent)?;
    Ok(CompletionResponse {
        text,
        model: data.model,
    })
}

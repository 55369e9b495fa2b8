//! HTTP provider clients.
//!
//! OpenAI, xAI and Gemini all speak the OpenAI chat-completions dialect and share
//! [`OpenAICompatibleClient`]; Anthropic uses its Messages API.

use super::{ProviderClient, Question, QuestionSpec};
use crate::error::{ConfigurationError, ProviderError};
use crate::types::{ModelId, ProviderId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_OUTPUT_TOKENS: u32 = 1024;
const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You write original assessment questions. \
Reply with the question only, including answer options when the format needs them.";

fn user_prompt(spec: &QuestionSpec) -> String {
    format!(
        "Write one new {} assessment question.",
        spec.question_type
    )
}

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ConfigurationError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .build()
        .map_err(|e| ConfigurationError::Invalid(format!("Failed to create HTTP client: {}", e)))
}

// Helper function to map transport errors to ProviderError
fn map_http_error(error: reqwest::Error, request_timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(request_timeout)
    } else if error.is_connect() {
        ProviderError::Connection(format!("Connection error: {}", error))
    } else if let Some(status) = error.status() {
        ProviderError::from_status(status.as_u16(), error.to_string())
    } else {
        ProviderError::Connection(format!("HTTP error: {}", error))
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::from_status(status, error_text))
}

// OpenAI-compatible API request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for providers exposing the OpenAI chat-completions API.
pub struct OpenAICompatibleClient {
    client: Client,
    provider: ProviderId,
    default_model: ModelId,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
}

impl OpenAICompatibleClient {
    /// `request_timeout` bounds one HTTP exchange, matching the per-attempt timeout.
    pub fn new(
        provider: ProviderId,
        default_model: ModelId,
        api_key: String,
        base_url: String,
        request_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
            provider,
            default_model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAICompatibleClient {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    fn default_model(&self) -> &ModelId {
        &self.default_model
    }

    async fn generate(
        &self,
        model: Option<&ModelId>,
        spec: &QuestionSpec,
    ) -> Result<Question, ProviderError> {
        let model = model.unwrap_or(&self.default_model);
        let request = ChatCompletionRequest {
            model: model.as_str(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(spec),
                },
            ],
            max_tokens: MAX_OUTPUT_TOKENS,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_http_error(e, self.request_timeout))?;
        let response = error_for_status(response).await?;

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".to_string()))?;

        Ok(Question {
            content: choice.message.content,
            model: completion
                .model
                .map(ModelId::new)
                .unwrap_or_else(|| model.clone()),
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client
pub struct AnthropicClient {
    client: Client,
    default_model: ModelId,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    pub fn new(
        default_model: ModelId,
        api_key: String,
        base_url: String,
        request_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
            default_model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn default_model(&self) -> &ModelId {
        &self.default_model
    }

    async fn generate(
        &self,
        model: Option<&ModelId>,
        spec: &QuestionSpec,
    ) -> Result<Question, ProviderError> {
        let model = model.unwrap_or(&self.default_model);
        let request_body = json!({
            "model": model.as_str(),
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": user_prompt(spec)}],
        });

        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| map_http_error(e, self.request_timeout))?;
        let response = error_for_status(response).await?;

        let message: MessagesResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;
        let content: String = message
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");
        if content.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "No text content in response".to_string(),
            ));
        }

        Ok(Question {
            content,
            model: message
                .model
                .map(ModelId::new)
                .unwrap_or_else(|| model.clone()),
        })
    }
}

//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::traits::ModelProvider;
use super::types::{Completion, InvokeOptions, LlmUsage, ModelError, Prompt};
use crate::application::identity::IdentityLoader;
use crate::domain::ChatMessage;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const API_PATH: &str = "/v1/chat/completions";
const MAX_TRANSPORT_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub struct OpenAiProvider {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    identity: IdentityLoader,
}

impl OpenAiProvider {
    /// Build a provider reading the API key from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>, identity: IdentityLoader) -> Result<Self, ModelError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        Ok(Self::with_api_key(model, identity, api_key))
    }

    pub fn with_api_key(
        model: impl Into<String>,
        identity: IdentityLoader,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            identity,
        }
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn call(
        &self,
        prompt: Prompt,
        options: &InvokeOptions,
        json_mode: bool,
    ) -> Result<Completion, ModelError> {
        let base_prompt = self.identity.load().await?;
        let mut messages = vec![wire_message(&ChatMessage::system(base_prompt))];
        for message in prompt.into_messages() {
            messages.push(wire_message(&message));
        }

        let payload = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object",
            }),
        };

        info!(
            provider = self.name(),
            model = %self.model,
            json_mode,
            "sending chat completion request"
        );
        let response = self.post_with_retry(&payload, options).await?;

        let usage = response.usage.map(|usage| LlmUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
            model: self.model.clone(),
        });
        if let Some(usage) = &usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "recorded token usage"
            );
        }

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| ModelError::invalid_response(self.name(), "missing content"))?;

        Ok(Completion { content, usage })
    }

    /// POST the request, retrying transport failures with exponential backoff.
    async fn post_with_retry(
        &self,
        payload: &ChatRequest,
        options: &InvokeOptions,
    ) -> Result<ChatResponse, ModelError> {
        let url = format!("{}{}", self.endpoint.trim_end_matches('/'), API_PATH);
        let mut last_error = None;

        for attempt in 1..=MAX_TRANSPORT_RETRIES {
            let send = async {
                self.http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(payload)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<ChatResponse>()
                    .await
            };

            let result = tokio::select! {
                biased;
                _ = options.cancel.cancelled() => return Err(ModelError::Cancelled),
                result = send => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(source) => {
                    warn!(
                        provider = self.name(),
                        attempt,
                        %source,
                        "chat completion request failed"
                    );
                    last_error = Some(source);
                    if attempt < MAX_TRANSPORT_RETRIES {
                        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                    }
                }
            }
        }

        Err(ModelError::transport(
            self.name(),
            last_error.expect("at least one attempt"),
        ))
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(
        &self,
        prompt: Prompt,
        options: &InvokeOptions,
    ) -> Result<Completion, ModelError> {
        self.call(prompt, options, false).await
    }

    async fn invoke_json_mode(
        &self,
        prompt: Prompt,
        options: &InvokeOptions,
    ) -> Result<Completion, ModelError> {
        self.call(prompt, options, true).await
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    serde_json::json!({
        "role": message.role.wire_name(),
        "content": message.content,
    })
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageBody>,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

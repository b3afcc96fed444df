use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::identity::IdentityError;
use crate::domain::ChatMessage;

/// Input to a model call: either a bare string (sent as one human message) or
/// a full message transcript.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Prompt {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            Prompt::Text(text) => vec![ChatMessage::human(text)],
            Prompt::Messages(messages) => messages,
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<ChatMessage>> for Prompt {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Prompt::Messages(messages)
    }
}

/// Per-call knobs. The cancellation token aborts the call at the next
/// suspension point.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub cancel: CancellationToken,
}

impl InvokeOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }
}

/// Token accounting for one call, where the vendor exposes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub model: String,
}

/// Assistant text plus optional usage accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("identity prompt unavailable: {0}")]
    Identity(#[from] IdentityError),

    #[error("model request to '{provider}' failed: {message}")]
    Transport { provider: String, message: String },

    #[error("model '{provider}' returned an unusable response: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error(
        "model response could not be parsed as structured output after {attempts} attempt(s); last response: {raw}"
    )]
    StructuredParse { attempts: u32, raw: String },

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("model call was cancelled")]
    Cancelled,
}

impl ModelError {
    pub fn transport(provider: impl Into<String>, message: impl ToString) -> Self {
        ModelError::Transport {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

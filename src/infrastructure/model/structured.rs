//! Schema-validated model calls with recovery.
//!
//! Each attempt asks the model for a single JSON object, parses the body
//! directly, and falls back to extracting a fenced code block before giving
//! up on the attempt. Failed attempts back off exponentially; the terminal
//! error carries the last raw response body.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::traits::ModelProvider;
use super::types::{InvokeOptions, LlmUsage, ModelError, Prompt};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// A validated value plus the raw body it was parsed from.
#[derive(Debug, Clone)]
pub struct StructuredCompletion<T> {
    pub value: T,
    pub raw: String,
    pub usage: Option<LlmUsage>,
}

/// Call the model until the response deserializes into `T`, or fail with the
/// last raw body. Never returns a value that failed validation.
pub async fn invoke_structured<T>(
    provider: &dyn ModelProvider,
    prompt: Prompt,
    options: &InvokeOptions,
) -> Result<StructuredCompletion<T>, ModelError>
where
    T: DeserializeOwned,
{
    let mut last_raw = String::new();

    for attempt in 1..=MAX_ATTEMPTS {
        match provider.invoke_json_mode(prompt.clone(), options).await {
            Ok(completion) => match parse_structured::<T>(&completion.content) {
                Ok(value) => {
                    debug!(attempt, "structured response parsed");
                    return Ok(StructuredCompletion {
                        value,
                        raw: completion.content,
                        usage: completion.usage,
                    });
                }
                Err(source) => {
                    warn!(attempt, %source, "structured response failed to parse");
                    last_raw = completion.content;
                }
            },
            // Identity problems and cancellation will not improve on retry.
            Err(err @ (ModelError::Identity(_) | ModelError::Cancelled | ModelError::MissingApiKey)) => {
                return Err(err);
            }
            Err(source) => {
                warn!(attempt, %source, "structured call failed before parsing");
                last_raw = source.to_string();
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
        }
    }

    Err(ModelError::StructuredParse {
        attempts: MAX_ATTEMPTS,
        raw: last_raw,
    })
}

fn parse_structured<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str::<T>(body.trim()) {
        Ok(value) => Ok(value),
        Err(direct_err) => match extract_fenced_block(body) {
            Some(inner) => serde_json::from_str::<T>(inner.trim()),
            None => Err(direct_err),
        },
    }
}

/// Inner text of the first fenced code block, skipping an optional language
/// tag on the opening fence.
pub fn extract_fenced_block(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let after_fence = &content[start + 3..];
    let body_start = match after_fence.find('\n') {
        Some(newline) => newline + 1,
        None => return None,
    };
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Greeting {
        message: String,
    }

    #[test]
    fn extracts_fenced_block_with_language_tag() {
        let body = "Here you go:\n```json\n{\"message\": \"hi\"}\n```\nDone.";
        assert_eq!(extract_fenced_block(body), Some("{\"message\": \"hi\"}\n"));
    }

    #[test]
    fn extracts_fenced_block_without_language_tag() {
        let body = "```\n{\"message\": \"hi\"}\n```";
        assert_eq!(extract_fenced_block(body), Some("{\"message\": \"hi\"}\n"));
    }

    #[test]
    fn no_fence_yields_none() {
        assert_eq!(extract_fenced_block("{\"message\": \"hi\"}"), None);
        assert_eq!(extract_fenced_block("plain text"), None);
    }

    #[test]
    fn parses_direct_json() {
        let value: Greeting = parse_structured("{\"message\": \"hi\"}").unwrap();
        assert_eq!(value.message, "hi");
    }

    #[test]
    fn recovers_json_from_fence() {
        let body = "```json\n{\"message\": \"hi\"}\n```";
        let value: Greeting = parse_structured(body).unwrap();
        assert_eq!(value.message, "hi");
    }

    #[test]
    fn schema_mismatch_is_an_error() {
        let result = parse_structured::<Greeting>("{\"other\": 1}");
        assert!(result.is_err());
    }
}

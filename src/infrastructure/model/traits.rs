use async_trait::async_trait;

use super::types::{Completion, InvokeOptions, ModelError, Prompt};

/// A chat-completion backend. Implementations prepend the identity prompt as
/// the leading system message on every call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Plain text call.
    async fn invoke(&self, prompt: Prompt, options: &InvokeOptions)
        -> Result<Completion, ModelError>;

    /// Same, but with the vendor's JSON-object mode enabled so the response
    /// body is (nominally) a single JSON document. Parsing and validation are
    /// the caller's concern; see [`super::invoke_structured`].
    async fn invoke_json_mode(
        &self,
        prompt: Prompt,
        options: &InvokeOptions,
    ) -> Result<Completion, ModelError>;
}

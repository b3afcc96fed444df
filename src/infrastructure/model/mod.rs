//! Language-model access: the provider trait, the OpenAI-compatible client,
//! and schema-validated structured calls.

mod openai;
mod structured;
mod traits;
mod types;

pub use openai::OpenAiProvider;
pub use structured::{extract_fenced_block, invoke_structured, StructuredCompletion};
pub use traits::ModelProvider;
pub use types::{Completion, InvokeOptions, LlmUsage, ModelError, Prompt};

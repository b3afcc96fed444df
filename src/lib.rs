//! Astrolabe is an autonomous-agent runtime: given a user request it asks a
//! language model for a plan of atomic tasks, executes each task either as a
//! direct model call or as an MCP tool invocation, evaluates progress after
//! every step, and synthesizes a final answer. Sessions are checkpointed so a
//! conversation can be resumed by id.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use application::agent::{Agent, AgentError, AgentResponse, AgentState, Plan, Task, TaskResult};
pub use application::identity::{IdentityError, IdentityLoader};
pub use application::tooling::{
    HttpStreamTransport, McpExecutor, SseTransport, StdioTransport, ToolCallValidation,
    ToolDescriptor, ToolDispatch, ToolOutcome, Transport, TransportError,
};
pub use config::{ConfigError, McpConfig, ServerConfig, TransportKind};
pub use infrastructure::checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use infrastructure::model::{
    Completion, InvokeOptions, LlmUsage, ModelError, ModelProvider, OpenAiProvider, Prompt,
};

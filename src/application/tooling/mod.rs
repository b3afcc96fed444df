//! MCP tool dispatch: transports, JSON-RPC plumbing, and the executor that
//! routes `server:tool` calls.

mod error;
mod executor;
mod http_stream;
mod rpc;
mod sse;
mod stdio;
mod transport;

pub use error::TransportError;
pub use executor::{
    global, install_global, McpExecutor, ToolCallValidation, ToolDispatch, ToolOutcome,
    CANCELLED_ERROR,
};
pub use http_stream::HttpStreamTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use transport::{create_transport, ToolDescriptor, Transport, DEFAULT_REQUEST_TIMEOUT};

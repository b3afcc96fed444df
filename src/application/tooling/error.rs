use thiserror::Error;

/// Failure kinds a transport can report.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("MCP server '{server}' is unavailable: {message}")]
    Unavailable { server: String, message: String },

    #[error("MCP server '{server}' violated the wire protocol: {message}")]
    Protocol { server: String, message: String },

    #[error("request to MCP server '{server}' timed out after {seconds}s")]
    Timeout { server: String, seconds: u64 },

    #[error("MCP server '{server}' reported error {code}: {message}")]
    Remote {
        server: String,
        code: i64,
        message: String,
    },
}

impl TransportError {
    pub fn unavailable(server: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Unavailable {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn protocol(server: impl Into<String>, message: impl Into<String>) -> Self {
        TransportError::Protocol {
            server: server.into(),
            message: message.into(),
        }
    }
}

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to spawn tool server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool server '{server}' did not complete the handshake within {timeout:?}")]
    HandshakeTimeout { server: String, timeout: Duration },
    #[error("tool server '{server}' protocol violation: {message}")]
    Protocol { server: String, message: String },
    #[error("tool call '{tool}' on server '{server}' timed out after {timeout:?}")]
    ToolTimeout {
        server: String,
        tool: String,
        timeout: Duration,
    },
    #[error("tool server '{server}' reported a failure for '{tool}': {message}")]
    Tool {
        server: String,
        tool: String,
        message: String,
    },
    #[error("tool '{tool}' is not exposed by server '{server}'")]
    UnknownTool { server: String, tool: String },
    #[error("arguments for tool '{tool}' violate its input schema: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("gateway for '{server}' is {state} and cannot accept the call")]
    NotReady {
        server: String,
        state: &'static str,
    },
}

impl GatewayError {
    /// Whether the agent may keep reasoning after this failure. Everything
    /// scoped to a single call is recoverable; transport and lifecycle
    /// failures end the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::Tool { .. }
                | GatewayError::ToolTimeout { .. }
                | GatewayError::UnknownTool { .. }
                | GatewayError::InvalidArguments { .. }
        )
    }
}

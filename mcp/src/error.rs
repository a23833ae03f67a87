//! Upstream MCP error types.
//!
//! Covers configuration validation, session lifecycle, transport failures,
//! and tool invocation errors.

use thiserror::Error;

pub type UpstreamResult<T> = Result<T, UpstreamError>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Server '{0}' is disabled")]
    Disabled(String),

    #[error("Server '{0}' is not running")]
    NotRunning(String),

    #[error("Tool '{tool}' not found on server '{server}'. Available tools: {}", .available.join(", "))]
    ToolNotFound {
        server: String,
        tool: String,
        available: Vec<String>,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UpstreamError {
    /// Connection errors that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            UpstreamError::Config(_) | UpstreamError::Transport(_) | UpstreamError::Cancelled => {
                true
            }
            UpstreamError::ConnectionFailed(msg) => {
                msg.contains("initialize")
                    || msg.contains("connection closed")
                    || msg.contains("connection refused")
                    || msg.contains("invalid URL")
                    || msg.contains("not found")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_lists_available() {
        let err = UpstreamError::ToolNotFound {
            server: "alpha".to_string(),
            tool: "nope".to_string(),
            available: vec!["t1".to_string(), "t2".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("alpha"));
        assert!(msg.contains("nope"));
        assert!(msg.contains("t1, t2"));
    }

    #[test]
    fn test_permanent_classification() {
        assert!(UpstreamError::Config("bad".to_string()).is_permanent());
        assert!(UpstreamError::ConnectionFailed("connection refused".to_string()).is_permanent());
        assert!(!UpstreamError::ConnectionFailed("timed out".to_string()).is_permanent());
        assert!(!UpstreamError::ToolExecution("boom".to_string()).is_permanent());
    }
}

//! Gateway-level error types.

use thiserror::Error;
use toolgate_mcp::UpstreamError;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Embedding backend error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Phrase generation failed: {0}")]
    PhraseGeneration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_passes_through() {
        let err: GatewayError = UpstreamError::ServerNotFound("a".to_string()).into();
        assert_eq!(err.to_string(), "Server not found: a");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = GatewayError::DimensionMismatch {
            expected: 1536,
            got: 768,
        };
        assert!(err.to_string().contains("1536"));
        assert!(err.to_string().contains("768"));
    }
}

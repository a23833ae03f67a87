//! Embedding and chat-completion backends.
//!
//! The gateway only ever needs two operations from the outside world:
//! turning a string into a fixed-length vector, and asking a chat model for
//! a short rewrite. Both are narrow traits with one adapter per wire format
//! (OpenAI-compatible and Ollama).

mod ollama;
mod openai;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    config::{ChatConfig, EmbeddingConfig, ProviderKind},
    error::GatewayResult,
};
pub use ollama::{OllamaChat, OllamaEmbedding};
pub use openai::{OpenAiChat, OpenAiEmbedding};

/// Connect timeout for the model backends.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. The returned vector length must be stable for the
    /// lifetime of the backend.
    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>>;
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32)
        -> GatewayResult<String>;
}

/// Build the shared HTTP client for a model backend. The overall timeout is
/// generous because local inference can take minutes on first load.
pub(crate) fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn build_embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaEmbedding::new(config)),
        ProviderKind::Openai => Arc::new(OpenAiEmbedding::new(config)),
    }
}

pub fn build_chat_provider(config: &ChatConfig) -> Arc<dyn ChatProvider> {
    match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaChat::new(config)),
        ProviderKind::Openai => Arc::new(OpenAiChat::new(config)),
    }
}

/// Parse a float array out of a JSON value.
pub(crate) fn parse_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value.as_array().map(|values| {
        values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_vector() {
        let value = json!([0.25, -1.5, 3.0]);
        assert_eq!(parse_vector(&value), Some(vec![0.25, -1.5, 3.0]));
        assert_eq!(parse_vector(&json!("nope")), None);
    }

    #[test]
    fn test_provider_selection() {
        let mut config = EmbeddingConfig::default();
        config.provider = ProviderKind::Ollama;
        let _ollama = build_embedding_provider(&config);
        config.provider = ProviderKind::Openai;
        let _openai = build_embedding_provider(&config);
    }
}

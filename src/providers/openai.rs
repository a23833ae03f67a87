//! OpenAI-compatible embedding and chat adapters.
//!
//! Any backend speaking `/v1/embeddings` and `/v1/chat/completions` works,
//! including vLLM, llama.cpp server, and OpenAI itself.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{build_http_client, parse_vector, ChatProvider, EmbeddingProvider};
use crate::{
    config::{ChatConfig, EmbeddingConfig},
    error::{GatewayError, GatewayResult},
};

/// Transient-failure retries before giving up.
const RETRY_ATTEMPTS: usize = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct OpenAiEmbedding {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            http_client: build_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let mut request = self.http_client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| GatewayError::Embedding(e.to_string()))?;
                    let vector = json["data"]
                        .as_array()
                        .and_then(|data| data.first())
                        .and_then(|first| parse_vector(&first["embedding"]));
                    match vector {
                        Some(v) if !v.is_empty() => return Ok(v),
                        _ => {
                            return Err(GatewayError::Embedding(
                                "embedding response had no vector".to_string(),
                            ))
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    last_error = Some(GatewayError::Embedding(format!(
                        "backend returned {}: {}",
                        status, text
                    )));
                }
                Err(e) => last_error = Some(GatewayError::Embedding(e.to_string())),
            }
            debug!(attempt, "embedding request failed, retrying");
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Embedding("unknown embedding error".to_string())))
    }
}

pub struct OpenAiChat {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            http_client: build_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> GatewayResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::PhraseGeneration(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::PhraseGeneration(format!(
                "backend returned {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::PhraseGeneration(e.to_string()))?;
        json["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                GatewayError::PhraseGeneration("chat response had no content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let mut config = EmbeddingConfig::default();
        config.base_url = "http://localhost:8000/".to_string();
        let provider = OpenAiEmbedding::new(&config);
        assert_eq!(provider.base_url, "http://localhost:8000");
    }
}

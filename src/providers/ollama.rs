//! Ollama embedding and chat adapters.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{build_http_client, parse_vector, ChatProvider, EmbeddingProvider};
use crate::{
    config::{ChatConfig, EmbeddingConfig},
    error::{GatewayError, GatewayResult},
};

const RETRY_ATTEMPTS: usize = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct OllamaEmbedding {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            http_client: build_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": self.model, "input": text });

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }

            match self.http_client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| GatewayError::Embedding(e.to_string()))?;
                    let vector = json["embeddings"]
                        .as_array()
                        .and_then(|rows| rows.first())
                        .and_then(parse_vector);
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

pub struct OllamaChat {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            http_client: build_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaChat {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> GatewayResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": temperature },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
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
        json["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                GatewayError::PhraseGeneration("chat response had no content".to_string())
            })
    }
}

//! Gateway configuration.
//!
//! A single YAML file configures the HTTP front-end, the embedding and chat
//! backends, the index, and the upstream server fleet. Nothing else is
//! persisted; the index is rebuilt from scratch on every start.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use toolgate_mcp::{UpstreamConfig, UpstreamServerConfig};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Seconds to wait for upstream sessions to stop before dropping their
    /// transports.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub servers: Vec<UpstreamServerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection_name: String,

    /// Advisory; the actual dimension is latched from the first embedding
    /// the backend returns.
    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,

    /// Rewrite search phrases with the chat model instead of the template.
    #[serde(default)]
    pub use_enhanced_phrase_generation: bool,

    /// Override for the phrase-generation prompt; `{tool_block}` is
    /// substituted with the tool summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_prompt: Option<String>,

    /// Restrict results to a server whose name occurs in the query instead
    /// of letting the phrase template influence ranking alone.
    #[serde(default)]
    pub server_hint_filter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Openai,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Local inference can be slow; keep this generous.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3030
}

fn default_collection() -> String {
    "tools".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_chat_model() -> String {
    "llama3.1".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    300
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection(),
            embedding_dimensions: default_dimensions(),
            use_enhanced_phrase_generation: false,
            phrase_prompt: None,
            server_hint_filter: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_chat_model(),
            temperature: default_temperature(),
            api_key: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub async fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file '{}'", path))?;
        let config: Self =
            serde_yaml::from_str(&content).with_context(|| format!("parsing '{}'", path))?;
        config.upstream().validate()?;
        Ok(config)
    }

    /// The upstream fleet section, in the shape the supervisor consumes.
    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            servers: self.servers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("empty config");
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 3030);
        assert_eq!(config.index.collection_name, "tools");
        assert_eq!(config.index.embedding_dimensions, 1536);
        assert!(!config.index.use_enhanced_phrase_generation);
        assert!(!config.index.server_hint_filter);
        assert_eq!(config.embedding.provider, ProviderKind::Ollama);
        assert_eq!(config.embedding.timeout_secs, 300);
        assert_eq!(config.chat.temperature, 0.2);
        assert_eq!(config.shutdown_grace_secs, 10);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080
index:
  collection_name: "mcp-tools"
  embedding_dimensions: 768
  use_enhanced_phrase_generation: true
  server_hint_filter: true
embedding:
  provider: openai
  base_url: "https://api.openai.com"
  model: "text-embedding-3-small"
  api_key: "sk-test"
chat:
  provider: openai
  base_url: "https://api.openai.com"
  model: "gpt-4o-mini"
  temperature: 0.1
servers:
  - name: "serena"
    protocol: stdio
    command: "serena-mcp"
  - name: "remote"
    protocol: sse
    url: "http://localhost:9000/sse"
    enabled: false
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).expect("full config");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.index.embedding_dimensions, 768);
        assert!(config.index.use_enhanced_phrase_generation);
        assert_eq!(config.embedding.provider, ProviderKind::Openai);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chat.temperature, 0.1);
        assert_eq!(config.servers.len(), 2);
        assert!(config.upstream().validate().is_ok());
        assert_eq!(config.upstream().enabled_count(), 1);
    }

    #[test]
    fn test_upstream_validation_surfaces_bad_servers() {
        let yaml = r#"
servers:
  - name: "broken"
    protocol: stdio
    command: ""
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).expect("parse");
        assert!(config.upstream().validate().is_err());
    }
}

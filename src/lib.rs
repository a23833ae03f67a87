//! toolgate — an MCP tool-aggregation gateway with semantic tool discovery.
//!
//! One process fronts a fleet of upstream MCP servers behind a single MCP
//! endpoint. Rather than advertising every upstream tool, the gateway
//! maintains an in-memory vector index over them and exposes a handful of
//! meta-tools: describe what you need, get back the closest tools with
//! ready-to-use invocations, then call through.
//!
//! - [`config`]: the YAML configuration surface
//! - [`providers`]: embedding / chat backends (OpenAI-compatible or Ollama)
//! - [`index`]: the refreshable vector index and semantic search
//! - [`server`]: the axum front-end and the meta-tool MCP server
//!
//! Upstream session management lives in the `toolgate-mcp` crate.

pub mod config;
pub mod error;
pub mod index;
pub mod providers;
pub mod server;

pub use config::AppConfig;
pub use error::{GatewayError, GatewayResult};
pub use index::{IndexSnapshot, SearchResult, ToolIndex, ToolVectorRecord, UpstreamHub};

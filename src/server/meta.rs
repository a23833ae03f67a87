//! The meta-tools this gateway itself exposes to downstream MCP clients.
//!
//! Instead of advertising every upstream tool (and blowing up the client's
//! context window), the gateway advertises five meta-tools: semantic search,
//! a full JSON listing, an index summary, call forwarding, and refresh.
//! Every error surfaces as plain text beginning with `"Error "` so an LLM
//! caller can read and react to it.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::index::{search, ToolIndex};
use toolgate_mcp::Parameter;

fn default_max_results() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.55
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchToolsRequest {
    #[schemars(description = "Natural-language description of the capability you need")]
    pub query: String,
    #[serde(rename = "maxResults", default = "default_max_results")]
    #[schemars(description = "Maximum number of results (default 5)")]
    pub max_results: usize,
    #[serde(rename = "minRelevanceScore", default = "default_min_score")]
    #[schemars(description = "Relevance threshold in [0, 1] (default 0.55)")]
    pub min_relevance_score: f32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CallExternalToolRequest {
    #[serde(rename = "serverName")]
    #[schemars(description = "Name of the upstream server, as listed by the index")]
    pub server_name: String,
    #[serde(rename = "toolName")]
    #[schemars(description = "Name of the tool on that server")]
    pub tool_name: String,
    #[serde(default)]
    #[schemars(description = "Arguments for the tool as a JSON object")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolListing {
    name: String,
    description: String,
    parameters: Vec<Parameter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerListing {
    server_name: String,
    tool_count: usize,
    tools: Vec<ToolListing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogListing {
    total_servers: usize,
    total_tools: usize,
    timestamp: String,
    servers: Vec<ServerListing>,
}

/// The MCP server served at `/mcp`.
#[derive(Clone)]
pub struct GatewayServer {
    index: Arc<ToolIndex>,
    cancel: CancellationToken,
    tool_router: ToolRouter<Self>,
}

impl GatewayServer {
    pub fn new(index: Arc<ToolIndex>, cancel: CancellationToken) -> Self {
        Self {
            index,
            cancel,
            tool_router: Self::tool_router(),
        }
    }

    fn text_result(text: impl Into<String>) -> CallToolResult {
        CallToolResult::success(vec![Content::text(text.into())])
    }

    fn error_result(text: impl Into<String>) -> CallToolResult {
        CallToolResult::error(vec![Content::text(text.into())])
    }
}

#[tool_router]
impl GatewayServer {
    #[tool(
        description = "Find upstream tools by describing what you want to do. Returns the most relevant tools with their parameters and a ready-to-use call_external_tool invocation for each."
    )]
    async fn search_tools_semantic(
        &self,
        Parameters(request): Parameters<SearchToolsRequest>,
    ) -> Result<CallToolResult, McpError> {
        if request.query.trim().is_empty() {
            return Ok(Self::error_result(
                "Error searching tools: query must not be empty",
            ));
        }

        let results = self
            .index
            .search(
                &request.query,
                request.max_results,
                request.min_relevance_score,
                &self.cancel,
            )
            .await;

        match results {
            Ok(results) if results.is_empty() => Ok(Self::text_result(search::render_no_results(
                &request.query,
                request.min_relevance_score,
            ))),
            Ok(results) => Ok(Self::text_result(search::render_results(&results))),
            Err(e) => Ok(Self::error_result(format!(
                "Error searching tools for '{}': {}",
                request.query, e
            ))),
        }
    }

    #[tool(
        description = "List every connected server and every tool it exposes, as pretty-printed JSON."
    )]
    async fn list_all_servers_and_tools_json(&self) -> Result<CallToolResult, McpError> {
        let by_server = self.index.all_tools();
        let listing = CatalogListing {
            total_servers: by_server.len(),
            total_tools: by_server.values().map(Vec::len).sum(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            servers: by_server
                .into_iter()
                .map(|(server_name, tools)| ServerListing {
                    server_name,
                    tool_count: tools.len(),
                    tools: tools
                        .into_iter()
                        .map(|tool| ToolListing {
                            name: tool.name,
                            description: tool.description,
                            parameters: tool.parameters,
                        })
                        .collect(),
                })
                .collect(),
        };

        match serde_json::to_string_pretty(&listing) {
            Ok(json) => Ok(Self::text_result(json)),
            Err(e) => Ok(Self::error_result(format!(
                "Error listing servers and tools: {}",
                e
            ))),
        }
    }

    #[tool(description = "Summarize the tool index: servers, tool counts, and search mode.")]
    async fn get_tool_index_info(&self) -> Result<CallToolResult, McpError> {
        let info = self.index.info();
        let mut summary = format!(
            "Semantic tool index '{}'\nServers: {}\nTools: {} ({} indexed for search)\nPhrase generation: {}\n",
            info.collection_name,
            info.server_count,
            info.total_tools,
            info.indexed_records,
            if self.index.enhanced_phrases_enabled() {
                "LLM-assisted"
            } else {
                "template"
            },
        );
        for (server_name, count) in &info.per_server {
            summary.push_str(&format!("  - {}: {} tools\n", server_name, count));
        }
        Ok(Self::text_result(summary))
    }

    #[tool(
        description = "Invoke a tool on an upstream server. Use search_tools_semantic first to find the server and tool names."
    )]
    async fn call_external_tool(
        &self,
        Parameters(request): Parameters<CallExternalToolRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .index
            .call_tool(
                &request.server_name,
                &request.tool_name,
                request.parameters,
                &self.cancel,
            )
            .await
        {
            Ok(output) => Ok(Self::text_result(output)),
            Err(e) => Ok(Self::error_result(format!(
                "Error calling tool '{}' on server '{}': {}. Check get_tool_index_info for available servers, or run refresh_tool_index and retry.",
                request.tool_name, request.server_name, e
            ))),
        }
    }

    #[tool(
        description = "Re-discover tools on every running upstream server and rebuild the search index."
    )]
    async fn refresh_tool_index(&self) -> Result<CallToolResult, McpError> {
        match self.index.refresh_full(&self.cancel).await {
            Ok(stats) => Ok(Self::text_result(format!(
                "Tool index refreshed: {} tools indexed across {} servers ({} skipped).",
                stats.tools_indexed, stats.servers, stats.tools_skipped
            ))),
            Err(e) => Ok(Self::error_result(format!(
                "Error refreshing tool index: {}",
                e
            ))),
        }
    }
}

#[tool_handler]
impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "toolgate".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("toolgate MCP tool gateway".into()),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "toolgate aggregates tools from multiple upstream MCP servers. \
Describe what you need to search_tools_semantic, then invoke the chosen tool \
with call_external_tool using the serverName and toolName from the results."
                    .into(),
            ),
        }
    }
}

//! HTTP front-end: the `/mcp` endpoint plus auxiliary REST routes.

pub mod meta;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::index::{SearchResult, ToolIndex};
use meta::GatewayServer;

const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_MIN_SCORE: f32 = 0.55;

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<ToolIndex>,
    pub cancel: CancellationToken,
}

/// Build the full router: REST endpoints plus the MCP service at `/mcp`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mcp_service = create_mcp_service(state.clone());

    Router::new()
        .route("/health", get(health))
        .route("/tool-index-info", get(tool_index_info))
        .route("/search-tools", post(search_tools))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The MCP-over-HTTP service (streamable HTTP with SSE fallback handled by
/// the transport itself).
fn create_mcp_service(
    state: AppState,
) -> StreamableHttpService<GatewayServer, LocalSessionManager> {
    let index = state.index.clone();
    let cancel = state.cancel.clone();
    let service_factory = move || Ok(GatewayServer::new(index.clone(), cancel.clone()));

    let session_manager = Arc::new(LocalSessionManager::default());
    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(std::time::Duration::from_secs(15)),
        stateful_mode: true,
        ..Default::default()
    };

    StreamableHttpService::new(service_factory, session_manager, config)
}

async fn health() -> &'static str {
    "MCP Server is running"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ToolIndexInfoResponse {
    service_type: String,
    is_semantic_kernel_enabled: bool,
}

async fn tool_index_info(State(state): State<AppState>) -> Json<ToolIndexInfoResponse> {
    Json(ToolIndexInfoResponse {
        service_type: "SemanticToolIndex".to_string(),
        is_semantic_kernel_enabled: state.index.enhanced_phrases_enabled(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchToolsHttpRequest {
    prompt: String,
    max_results: Option<usize>,
    min_relevance_score: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchToolsHttpResponse {
    query: String,
    max_results: usize,
    min_relevance_score: f32,
    tools: Vec<SearchResult>,
}

async fn search_tools(
    State(state): State<AppState>,
    Json(request): Json<SearchToolsHttpRequest>,
) -> Result<Json<SearchToolsHttpResponse>, (StatusCode, String)> {
    if request.prompt.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Error searching tools: prompt must not be empty".to_string(),
        ));
    }

    let max_results = request.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let min_relevance_score = request.min_relevance_score.unwrap_or(DEFAULT_MIN_SCORE);

    match state
        .index
        .search(&request.prompt, max_results, min_relevance_score, &state.cancel)
        .await
    {
        Ok(tools) => Ok(Json(SearchToolsHttpResponse {
            query: request.prompt,
            max_results,
            min_relevance_score,
            tools,
        })),
        Err(e) => {
            error!(error = %e, "search-tools endpoint failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error searching tools: {}", e),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_response_uses_pascal_case_keys() {
        let response = ToolIndexInfoResponse {
            service_type: "SemanticToolIndex".to_string(),
            is_semantic_kernel_enabled: false,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["ServiceType"], "SemanticToolIndex");
        assert_eq!(json["IsSemanticKernelEnabled"], false);
    }

    #[test]
    fn test_search_request_parses_pascal_case() {
        let request: SearchToolsHttpRequest = serde_json::from_str(
            r#"{"Prompt": "save a memory", "MaxResults": 3, "MinRelevanceScore": 0.4}"#,
        )
        .unwrap();
        assert_eq!(request.prompt, "save a memory");
        assert_eq!(request.max_results, Some(3));
        assert_eq!(request.min_relevance_score, Some(0.4));

        let defaults: SearchToolsHttpRequest =
            serde_json::from_str(r#"{"Prompt": "x"}"#).unwrap();
        assert!(defaults.max_results.is_none());
        assert!(defaults.min_relevance_score.is_none());
    }

    #[test]
    fn test_search_response_shape() {
        let response = SearchToolsHttpResponse {
            query: "q".to_string(),
            max_results: 5,
            min_relevance_score: 0.55,
            tools: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["Query"], "q");
        assert_eq!(json["MaxResults"], 5);
        assert!(json["Tools"].as_array().unwrap().is_empty());
    }
}

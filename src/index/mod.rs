//! The refreshable in-memory tool index.
//!
//! The index owns two views of the fleet's tools: `by_server` (descriptor
//! lists in upstream order) and `records` (one vector record per
//! `server.tool`). Both live in a single immutable [`IndexSnapshot`]
//! published through an `ArcSwap`, so readers always observe either the full
//! old state or the full new state — never a half-built one.

pub mod phrase;
pub mod search;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    config::IndexConfig,
    error::{GatewayError, GatewayResult},
    providers::{ChatProvider, EmbeddingProvider},
};
pub use search::SearchResult;
use toolgate_mcp::{Supervisor, ToolDescriptor, UpstreamResult};

/// What the index needs from the upstream side. `Supervisor` is the real
/// implementation; tests substitute a scripted one.
#[async_trait]
pub trait UpstreamHub: Send + Sync {
    /// `(server name, ordered tool descriptors)` for every running session.
    fn running_tools(&self) -> Vec<(String, Vec<ToolDescriptor>)>;

    /// Forward a `tools/call` to a named server.
    async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<String>;

    /// Re-run tool discovery on every running session.
    async fn refresh_sessions(&self, cancel: &CancellationToken);
}

#[async_trait]
impl UpstreamHub for Supervisor {
    fn running_tools(&self) -> Vec<(String, Vec<ToolDescriptor>)> {
        self.running()
            .into_iter()
            .map(|session| (session.name().to_string(), session.tools()))
            .collect()
    }

    async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<String> {
        self.call(server_name, tool_name, params, cancel).await
    }

    async fn refresh_sessions(&self, cancel: &CancellationToken) {
        self.refresh_all_tools(cancel).await;
    }
}

/// One entry in the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct ToolVectorRecord {
    /// `"{server}.{tool}"` — the authoritative record key.
    pub id: String,
    pub server_name: String,
    pub tool_name: String,
    pub description: String,
    pub parameters_json: String,
    pub parameter_count: usize,
    pub parameter_names: Vec<String>,
    pub search_phrase: String,
    pub embedding: Vec<f32>,
    pub last_updated: DateTime<Utc>,
}

/// Immutable published state. Replaced wholesale on refresh.
#[derive(Default)]
pub struct IndexSnapshot {
    pub by_server: BTreeMap<String, Vec<ToolDescriptor>>,
    pub records: HashMap<String, ToolVectorRecord>,
    /// Embedding dimension of every record, once known.
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub servers: usize,
    pub tools_indexed: usize,
    pub tools_skipped: usize,
}

pub struct ToolIndex {
    hub: Arc<dyn UpstreamHub>,
    embeddings: Arc<dyn EmbeddingProvider>,
    chat: Option<Arc<dyn ChatProvider>>,
    config: IndexConfig,
    chat_temperature: f32,
    snapshot: ArcSwap<IndexSnapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after every completed refresh; used to coalesce concurrent
    /// refresh callers onto one rebuild.
    epoch: AtomicU64,
    last_stats: parking_lot::Mutex<RefreshStats>,
    /// Embedding dimension, latched from the first successful embedding for
    /// the lifetime of the process.
    dimension: OnceLock<usize>,
}

impl ToolIndex {
    pub fn new(
        hub: Arc<dyn UpstreamHub>,
        embeddings: Arc<dyn EmbeddingProvider>,
        chat: Option<Arc<dyn ChatProvider>>,
        config: IndexConfig,
        chat_temperature: f32,
    ) -> Self {
        Self {
            hub,
            embeddings,
            chat,
            config,
            chat_temperature,
            snapshot: ArcSwap::from_pointee(IndexSnapshot::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            last_stats: parking_lot::Mutex::new(RefreshStats::default()),
            dimension: OnceLock::new(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    pub fn enhanced_phrases_enabled(&self) -> bool {
        self.config.use_enhanced_phrase_generation && self.chat.is_some()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.load_full()
    }

    pub fn all_tools(&self) -> BTreeMap<String, Vec<ToolDescriptor>> {
        self.snapshot.load().by_server.clone()
    }

    pub fn server_tools(&self, server_name: &str) -> Option<Vec<ToolDescriptor>> {
        self.snapshot.load().by_server.get(server_name).cloned()
    }

    /// Re-discover upstream tools, then rebuild the index.
    pub async fn refresh_full(&self, cancel: &CancellationToken) -> GatewayResult<RefreshStats> {
        self.hub.refresh_sessions(cancel).await;
        self.refresh(cancel).await
    }

    /// Atomically rebuild the entire index from the currently running
    /// sessions.
    ///
    /// At most one rebuild is in flight; a caller that blocked behind one
    /// returns that rebuild's stats instead of rebuilding again. Per-tool
    /// embedding failures are logged and the tool skipped — a broken backend
    /// yields an empty (but consistent) index, never a partial one.
    pub async fn refresh(&self, cancel: &CancellationToken) -> GatewayResult<RefreshStats> {
        let epoch_before = self.epoch.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;
        if self.epoch.load(Ordering::Acquire) != epoch_before {
            // Somebody rebuilt while we waited; their outcome is ours.
            return Ok(self.last_stats.lock().clone());
        }

        let fleet = self.hub.running_tools();
        let mut stats = RefreshStats {
            servers: fleet.len(),
            ..Default::default()
        };

        let mut by_server = BTreeMap::new();
        let mut pairs: Vec<(String, ToolDescriptor)> = Vec::new();
        for (server_name, tools) in &fleet {
            by_server.insert(server_name.clone(), tools.clone());
            for tool in tools {
                pairs.push((server_name.clone(), tool.clone()));
            }
        }

        // All phrases are derived before any embedding is requested so a
        // local backend is not asked to swap models per tool.
        let chat = if self.config.use_enhanced_phrase_generation {
            self.chat.as_deref()
        } else {
            None
        };
        let phrases = phrase::generate_phrases(
            chat,
            self.config.phrase_prompt.as_deref(),
            self.chat_temperature,
            &pairs,
        )
        .await;

        let mut records = HashMap::with_capacity(pairs.len());
        for ((server_name, tool), search_phrase) in pairs.into_iter().zip(phrases) {
            let embedding = tokio::select! {
                result = self.embeddings.embed(&search_phrase) => result,
                _ = cancel.cancelled() => {
                    return Err(toolgate_mcp::UpstreamError::Cancelled.into());
                }
            };
            let embedding = match embedding {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(
                        server = %server_name,
                        tool = %tool.name,
                        error = %e,
                        "embedding failed, skipping tool"
                    );
                    stats.tools_skipped += 1;
                    continue;
                }
            };

            if let Err(e) = self.check_dimension(embedding.len()) {
                warn!(
                    server = %server_name,
                    tool = %tool.name,
                    error = %e,
                    "rejecting embedding, skipping tool"
                );
                stats.tools_skipped += 1;
                continue;
            }

            let id = format!("{}.{}", server_name, tool.name);
            let record = ToolVectorRecord {
                id: id.clone(),
                server_name,
                tool_name: tool.name.clone(),
                description: tool.description.clone(),
                parameters_json: serde_json::to_string(&tool.parameters).unwrap_or_else(|_| "[]".to_string()),
                parameter_count: tool.parameters.len(),
                parameter_names: tool.parameters.iter().map(|p| p.name.clone()).collect(),
                search_phrase,
                embedding,
                last_updated: Utc::now(),
            };
            records.insert(id, record);
            stats.tools_indexed += 1;
        }

        self.snapshot.store(Arc::new(IndexSnapshot {
            by_server,
            records,
            dimension: self.dimension.get().copied(),
        }));
        *self.last_stats.lock() = stats.clone();
        self.epoch.fetch_add(1, Ordering::Release);

        info!(
            collection = %self.config.collection_name,
            servers = stats.servers,
            indexed = stats.tools_indexed,
            skipped = stats.tools_skipped,
            "tool index refreshed"
        );
        Ok(stats)
    }

    /// Latch the embedding dimension on first use; reject anything else
    /// afterwards rather than letting a backend change corrupt the store.
    fn check_dimension(&self, got: usize) -> GatewayResult<()> {
        match self.dimension.get() {
            None => {
                let latched = *self.dimension.get_or_init(|| got);
                if latched == got {
                    if got != self.config.embedding_dimensions {
                        info!(
                            configured = self.config.embedding_dimensions,
                            actual = got,
                            "embedding dimension differs from configured value, using actual"
                        );
                    }
                    Ok(())
                } else {
                    Err(GatewayError::DimensionMismatch {
                        expected: latched,
                        got,
                    })
                }
            }
            Some(&expected) if expected == got => Ok(()),
            Some(&expected) => Err(GatewayError::DimensionMismatch { expected, got }),
        }
    }

    /// Embed the query and rank every record by cosine similarity.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
        cancel: &CancellationToken,
    ) -> GatewayResult<Vec<SearchResult>> {
        let query_embedding = tokio::select! {
            result = self.embeddings.embed(query) => result?,
            _ = cancel.cancelled() => {
                return Err(toolgate_mcp::UpstreamError::Cancelled.into());
            }
        };

        let snapshot = self.snapshot.load_full();
        if let Some(expected) = snapshot.dimension {
            if query_embedding.len() != expected {
                return Err(GatewayError::DimensionMismatch {
                    expected,
                    got: query_embedding.len(),
                });
            }
        }

        let hinted_servers = self.query_server_hints(query, &snapshot);
        let records = snapshot.records.values().filter(|record| {
            hinted_servers
                .as_ref()
                .map(|servers| servers.contains(&record.server_name))
                .unwrap_or(true)
        });

        let ranked = search::rank_records(records, &query_embedding, max_results, min_score);
        Ok(ranked
            .into_iter()
            .map(|(record, score)| SearchResult::from_record(record, score))
            .collect())
    }

    /// When the hint filter is on and the query mentions an indexed server
    /// by name, restrict scoring to those servers.
    fn query_server_hints(
        &self,
        query: &str,
        snapshot: &IndexSnapshot,
    ) -> Option<Vec<String>> {
        if !self.config.server_hint_filter {
            return None;
        }
        let query_lower = query.to_lowercase();
        let matches: Vec<String> = snapshot
            .by_server
            .keys()
            .filter(|name| query_lower.contains(&name.to_lowercase()))
            .cloned()
            .collect();
        if matches.is_empty() {
            None
        } else {
            Some(matches)
        }
    }

    /// Thin delegation to the supervisor.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<String> {
        self.hub.call_tool(server_name, tool_name, params, cancel).await
    }

    /// Counts for the info surfaces.
    pub fn info(&self) -> IndexInfo {
        let snapshot = self.snapshot.load();
        IndexInfo {
            collection_name: self.config.collection_name.clone(),
            server_count: snapshot.by_server.len(),
            total_tools: snapshot.by_server.values().map(Vec::len).sum(),
            indexed_records: snapshot.records.len(),
            per_server: snapshot
                .by_server
                .iter()
                .map(|(name, tools)| (name.clone(), tools.len()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub collection_name: String,
    pub server_count: usize,
    pub total_tools: usize,
    pub indexed_records: usize,
    pub per_server: Vec<(String, usize)>,
}

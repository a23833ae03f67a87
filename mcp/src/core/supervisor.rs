//! Fleet lifecycle for upstream MCP sessions.
//!
//! The supervisor exclusively owns every session. Sessions exist for disabled
//! servers too, so a call against one reports "disabled" rather than
//! "unknown server".

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{config::UpstreamConfig, session::SessionState, session::UpstreamSession};
use crate::error::{UpstreamError, UpstreamResult};

pub struct Supervisor {
    sessions: DashMap<String, Arc<UpstreamSession>>,
    /// Config order, kept for deterministic listings.
    names: Vec<String>,
}

impl Supervisor {
    pub fn new(config: UpstreamConfig) -> UpstreamResult<Self> {
        config.validate()?;

        let sessions = DashMap::new();
        let mut names = Vec::with_capacity(config.servers.len());
        for server_config in config.servers {
            names.push(server_config.name.clone());
            sessions.insert(
                server_config.name.clone(),
                Arc::new(UpstreamSession::new(server_config)),
            );
        }

        Ok(Self { sessions, names })
    }

    /// Launch every enabled session in parallel. A failed session leaves the
    /// others running; returns `(started, total_enabled)`.
    pub async fn start_all(&self, cancel: &CancellationToken) -> (usize, usize) {
        let enabled: Vec<Arc<UpstreamSession>> = self
            .sessions_in_order()
            .into_iter()
            .filter(|s| s.is_enabled())
            .collect();
        let total = enabled.len();

        let results = futures::future::join_all(
            enabled.iter().map(|session| session.start(cancel)),
        )
        .await;

        let started = results.into_iter().filter(|ok| *ok).count();
        info!(started, total, "upstream startup complete");
        (started, total)
    }

    /// Signal every session to stop and wait up to `grace` for each. After
    /// the grace period the transport is dropped, which force-closes it.
    pub async fn stop_all(&self, grace: Duration) {
        let sessions = self.sessions_in_order();
        futures::future::join_all(sessions.iter().map(|session| async move {
            if tokio::time::timeout(grace, session.stop()).await.is_err() {
                warn!(
                    server = %session.name(),
                    "session did not stop within grace period, dropping transport"
                );
            }
        }))
        .await;
        info!("all upstream sessions stopped");
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<Arc<UpstreamSession>> {
        self.sessions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Sessions currently in `Running`, in config order.
    pub fn running(&self) -> Vec<Arc<UpstreamSession>> {
        self.sessions_in_order()
            .into_iter()
            .filter(|s| s.state() == SessionState::Running)
            .collect()
    }

    /// All sessions in config order.
    pub fn sessions_in_order(&self) -> Vec<Arc<UpstreamSession>> {
        self.names
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Re-run discovery on every running session. Per-session failures are
    /// logged and swallowed.
    pub async fn refresh_all_tools(&self, cancel: &CancellationToken) {
        let running = self.running();
        let results = futures::future::join_all(
            running.iter().map(|session| session.refresh_tools(cancel)),
        )
        .await;

        for (session, result) in running.iter().zip(results) {
            if let Err(e) = result {
                warn!(server = %session.name(), error = %e, "tool refresh failed");
            }
        }
    }

    /// Forward a call to a named server.
    pub async fn call(
        &self,
        server_name: &str,
        tool_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<String> {
        let session = self
            .get(server_name)
            .ok_or_else(|| UpstreamError::ServerNotFound(server_name.to_string()))?;
        session.call(tool_name, params, cancel).await
    }
}

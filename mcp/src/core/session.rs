//! One owned session per configured upstream MCP server.
//!
//! A session owns its transport exclusively: callers go through `call` and
//! `refresh_tools`, never the wire. State is tracked explicitly:
//!
//! ```text
//! Stopped ──start──▶ Starting ──(handshake ok, discover)──▶ Running
//!    ▲                   │                                     │
//!    │                   └──(error)──▶ Failed ──(stop)──▶ Stopped
//!    └──────────────── stop ──────────────────────────────────┘
//! ```
//!
//! `Failed` is terminal until an explicit re-start; `stop` is safe from any
//! state.

use std::{borrow::Cow, time::Duration};

use backoff::ExponentialBackoffBuilder;
use parking_lot::RwLock;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::RunningService,
    transport::{
        sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig,
        ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    config::{UpstreamServerConfig, UpstreamTransport},
    handler::GateClientHandler,
};
use crate::{
    error::{UpstreamError, UpstreamResult},
    inventory::ToolDescriptor,
};

type UpstreamClient = RunningService<RoleClient, GateClientHandler>;

/// Upper bound on transport construction plus MCP handshake during `start`.
const START_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Failed,
    Stopping,
}

pub struct UpstreamSession {
    config: UpstreamServerConfig,
    state: RwLock<SessionState>,
    client: tokio::sync::Mutex<Option<UpstreamClient>>,
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl UpstreamSession {
    pub fn new(config: UpstreamServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SessionState::Stopped),
            client: tokio::sync::Mutex::new(None),
            tools: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Snapshot of the most recently discovered tool descriptors.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().clone()
    }

    /// Bring the session up: connect the transport, perform the MCP
    /// handshake, and discover tools. Idempotent; returns whether the session
    /// is running afterwards. Never panics the fleet: all failures end in
    /// `Failed` with a log line.
    pub async fn start(&self, cancel: &CancellationToken) -> bool {
        if !self.config.enabled {
            debug!(server = %self.config.name, "session disabled, not starting");
            return false;
        }
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Running => return true,
                SessionState::Starting | SessionState::Stopping => return false,
                SessionState::Stopped | SessionState::Failed => *state = SessionState::Starting,
            }
        }

        let connected = tokio::select! {
            result = tokio::time::timeout(START_TIMEOUT, self.connect()) => {
                result.unwrap_or_else(|_| {
                    Err(UpstreamError::ConnectionFailed(
                        "handshake timed out".to_string(),
                    ))
                })
            }
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
        };

        let client = match connected {
            Ok(client) => client,
            Err(UpstreamError::Cancelled) => {
                info!(server = %self.config.name, "startup cancelled");
                *self.state.write() = SessionState::Stopped;
                return false;
            }
            Err(e) => {
                warn!(server = %self.config.name, error = %e, "failed to start session");
                *self.state.write() = SessionState::Failed;
                return false;
            }
        };

        // Discovery failure is not fatal: fall back to the declared tool
        // names until a refresh succeeds.
        let descriptors = match client.peer().list_all_tools().await {
            Ok(tools) => {
                info!(server = %self.config.name, count = tools.len(), "discovered tools");
                tools.iter().map(ToolDescriptor::from_tool).collect()
            }
            Err(e) => {
                warn!(
                    server = %self.config.name,
                    error = %e,
                    "tool discovery failed, using declared tool list"
                );
                self.config
                    .tools
                    .iter()
                    .map(|name| ToolDescriptor::from_declared(name))
                    .collect()
            }
        };

        *self.client.lock().await = Some(client);
        *self.tools.write() = descriptors;
        *self.state.write() = SessionState::Running;
        info!(server = %self.config.name, "session running");
        true
    }

    /// Close the MCP session and clear discovered state. Safe from any state.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Stopped {
                return;
            }
            *state = SessionState::Stopping;
        }

        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.cancel().await {
                warn!(server = %self.config.name, error = %e, "error closing session");
            }
        }

        self.tools.write().clear();
        *self.state.write() = SessionState::Stopped;
        info!(server = %self.config.name, "session stopped");
    }

    /// Forward a `tools/call` to the upstream server and flatten the text
    /// content blocks of its result.
    ///
    /// Lookup is case-insensitive, but the exact upstream-reported name goes
    /// on the wire.
    pub async fn call(
        &self,
        tool_name: &str,
        params: serde_json::Map<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> UpstreamResult<String> {
        if !self.config.enabled {
            return Err(UpstreamError::Disabled(self.config.name.clone()));
        }
        if self.state() != SessionState::Running {
            return Err(UpstreamError::NotRunning(self.config.name.clone()));
        }

        let wire_name = self.resolve_tool_name(tool_name)?;

        let peer = {
            let guard = self.client.lock().await;
            let client = guard
                .as_ref()
                .ok_or_else(|| UpstreamError::NotRunning(self.config.name.clone()))?;
            client.peer().clone()
        };

        let request = CallToolRequestParam {
            name: Cow::Owned(wire_name),
            arguments: Some(params),
        };

        let result = tokio::select! {
            result = peer.call_tool(request) => result
                .map_err(|e| UpstreamError::ToolExecution(format!(
                    "upstream '{}' call failed: {}", self.config.name, e
                )))?,
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
        };

        let text = flatten_text_content(&result);
        if result.is_error.unwrap_or(false) {
            return Err(UpstreamError::ToolExecution(format!(
                "upstream '{}' reported an error: {}",
                self.config.name, text
            )));
        }
        Ok(text)
    }

    /// Re-run tool discovery. An empty response keeps the previous list so a
    /// transient upstream hiccup never degrades a good index.
    pub async fn refresh_tools(&self, cancel: &CancellationToken) -> UpstreamResult<usize> {
        if self.state() != SessionState::Running {
            return Err(UpstreamError::NotRunning(self.config.name.clone()));
        }

        let peer = {
            let guard = self.client.lock().await;
            let client = guard
                .as_ref()
                .ok_or_else(|| UpstreamError::NotRunning(self.config.name.clone()))?;
            client.peer().clone()
        };

        let tools = tokio::select! {
            result = peer.list_all_tools() => result.map_err(|e| {
                UpstreamError::Transport(format!("tools/list failed: {}", e))
            })?,
            _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
        };

        if tools.is_empty() {
            warn!(
                server = %self.config.name,
                "refresh returned no tools, keeping previous list"
            );
            return Ok(self.tools.read().len());
        }

        let descriptors: Vec<ToolDescriptor> = tools.iter().map(ToolDescriptor::from_tool).collect();
        let count = descriptors.len();
        *self.tools.write() = descriptors;
        debug!(server = %self.config.name, count, "refreshed tools");
        Ok(count)
    }

    /// Resolve a tool name against the discovered set: exact match first,
    /// then case-insensitive.
    fn resolve_tool_name(&self, tool_name: &str) -> UpstreamResult<String> {
        let tools = self.tools.read();
        if let Some(descriptor) = tools.iter().find(|t| t.name == tool_name) {
            return Ok(descriptor.name.clone());
        }
        if let Some(descriptor) = tools
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(tool_name))
        {
            return Ok(descriptor.name.clone());
        }
        Err(UpstreamError::ToolNotFound {
            server: self.config.name.clone(),
            tool: tool_name.to_string(),
            available: tools.iter().map(|t| t.name.clone()).collect(),
        })
    }

    async fn connect(&self) -> UpstreamResult<UpstreamClient> {
        match &self.config.transport {
            UpstreamTransport::Stdio { .. } => self.connect_once().await,
            UpstreamTransport::Sse { .. } | UpstreamTransport::Streamable { .. } => {
                self.connect_with_retry().await
            }
        }
    }

    /// Exponential-backoff retry for remote transports. Stdio spawns never
    /// retry: a missing binary does not fix itself.
    async fn connect_with_retry(&self) -> UpstreamResult<UpstreamClient> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        backoff::future::retry(backoff, || async {
            match self.connect_once().await {
                Ok(client) => Ok(client),
                Err(e) if e.is_permanent() => {
                    warn!(server = %self.config.name, error = %e, "permanent connect error");
                    Err(backoff::Error::permanent(e))
                }
                Err(e) => {
                    warn!(server = %self.config.name, error = %e, "connect failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
    }

    async fn connect_once(&self) -> UpstreamResult<UpstreamClient> {
        info!(
            server = %self.config.name,
            transport = ?self.config.transport,
            "connecting"
        );

        match &self.config.transport {
            UpstreamTransport::Stdio {
                command,
                args,
                env,
                workdir,
            } => {
                // Env vars go to the child process only; the gateway's own
                // environment is never touched.
                let workdir = workdir.clone().or_else(dirs::home_dir);
                let transport = TokioChildProcess::new(
                    tokio::process::Command::new(command).configure(|cmd| {
                        cmd.args(args)
                            .envs(env.iter())
                            .stderr(std::process::Stdio::inherit());
                        if let Some(dir) = &workdir {
                            cmd.current_dir(dir);
                        }
                    }),
                )
                .map_err(|e| UpstreamError::Transport(format!("create stdio transport: {}", e)))?;

                GateClientHandler::new(&self.config.name)
                    .serve(transport)
                    .await
                    .map_err(|e| {
                        UpstreamError::ConnectionFailed(format!("initialize stdio client: {}", e))
                    })
            }

            UpstreamTransport::Sse { url, token, headers } => {
                self.connect_sse(url, token.as_deref(), headers).await
            }

            UpstreamTransport::Streamable { url, token, headers } => {
                match self.connect_streamable(url, token.as_deref()).await {
                    Ok(client) => Ok(client),
                    Err(e) => {
                        warn!(
                            server = %self.config.name,
                            error = %e,
                            "streamable HTTP connect failed, falling back to SSE"
                        );
                        self.connect_sse(url, token.as_deref(), headers).await
                    }
                }
            }
        }
    }

    async fn connect_sse(
        &self,
        url: &str,
        token: Option<&str>,
        headers: &std::collections::HashMap<String, String>,
    ) -> UpstreamResult<UpstreamClient> {
        let mut header_map = reqwest::header::HeaderMap::new();
        if let Some(token) = token {
            header_map.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token)
                    .parse()
                    .map_err(|e| UpstreamError::Transport(format!("auth token: {}", e)))?,
            );
        }
        for (name, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UpstreamError::Transport(format!("header '{}': {}", name, e)))?;
            let value = value
                .parse()
                .map_err(|e| UpstreamError::Transport(format!("header value: {}", e)))?;
            header_map.insert(name, value);
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(header_map)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("build HTTP client: {}", e)))?;

        let cfg = SseClientConfig {
            sse_endpoint: url.to_string().into(),
            ..Default::default()
        };

        let transport = SseClientTransport::start_with_client(http_client, cfg)
            .await
            .map_err(|e| UpstreamError::Transport(format!("create SSE transport: {}", e)))?;

        let client = GateClientHandler::new(&self.config.name)
            .serve(transport)
            .await
            .map_err(|e| {
                UpstreamError::ConnectionFailed(format!("initialize SSE client: {}", e))
            })?;

        info!(server = %self.config.name, url, "connected over SSE");
        Ok(client)
    }

    async fn connect_streamable(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> UpstreamResult<UpstreamClient> {
        let transport = if let Some(token) = token {
            let mut cfg = StreamableHttpClientTransportConfig::with_uri(url.to_string());
            cfg.auth_header = Some(token.to_string());
            StreamableHttpClientTransport::from_config(cfg)
        } else {
            StreamableHttpClientTransport::from_uri(url.to_string())
        };

        let client = GateClientHandler::new(&self.config.name)
            .serve(transport)
            .await
            .map_err(|e| {
                UpstreamError::ConnectionFailed(format!("initialize streamable client: {}", e))
            })?;

        info!(server = %self.config.name, url, "connected over streamable HTTP");
        Ok(client)
    }
}

/// Concatenate all text content blocks of a tool result with `"\n"`.
/// Non-text blocks (images, resources) are ignored.
pub fn flatten_text_content(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| content.as_text())
        .map(|text| text.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rmcp::model::Content;

    use super::*;

    fn stdio_config(name: &str, enabled: bool) -> UpstreamServerConfig {
        UpstreamServerConfig {
            name: name.to_string(),
            description: String::new(),
            transport: UpstreamTransport::Stdio {
                command: "mcp-server".to_string(),
                args: vec![],
                env: HashMap::new(),
                workdir: None,
            },
            enabled,
            tools: vec![],
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::from_declared(name)
    }

    #[test]
    fn test_new_session_is_stopped() {
        let session = UpstreamSession::new(stdio_config("a", true));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.tools().is_empty());
    }

    #[tokio::test]
    async fn test_start_disabled_returns_false() {
        let session = UpstreamSession::new(stdio_config("a", false));
        let cancel = CancellationToken::new();
        assert!(!session.start(&cancel).await);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_call_disabled() {
        let session = UpstreamSession::new(stdio_config("a", false));
        let cancel = CancellationToken::new();
        let err = session
            .call("t1", serde_json::Map::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Disabled(_)));
    }

    #[tokio::test]
    async fn test_call_not_running() {
        let session = UpstreamSession::new(stdio_config("a", true));
        let cancel = CancellationToken::new();
        let err = session
            .call("t1", serde_json::Map::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_stop_from_stopped_is_noop() {
        let session = UpstreamSession::new(stdio_config("a", true));
        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_refresh_not_running() {
        let session = UpstreamSession::new(stdio_config("a", true));
        let cancel = CancellationToken::new();
        assert!(matches!(
            session.refresh_tools(&cancel).await,
            Err(UpstreamError::NotRunning(_))
        ));
    }

    #[test]
    fn test_resolve_tool_name_case_insensitive() {
        let session = UpstreamSession::new(stdio_config("a", true));
        *session.tools.write() = vec![descriptor("WriteMemory"), descriptor("readMemory")];

        assert_eq!(session.resolve_tool_name("WriteMemory").unwrap(), "WriteMemory");
        assert_eq!(session.resolve_tool_name("writememory").unwrap(), "WriteMemory");
        assert_eq!(session.resolve_tool_name("READMEMORY").unwrap(), "readMemory");
    }

    #[test]
    fn test_resolve_unknown_tool_lists_available() {
        let session = UpstreamSession::new(stdio_config("a", true));
        *session.tools.write() = vec![descriptor("t1"), descriptor("t2")];

        match session.resolve_tool_name("nope") {
            Err(UpstreamError::ToolNotFound { server, available, .. }) => {
                assert_eq!(server, "a");
                assert_eq!(available, vec!["t1".to_string(), "t2".to_string()]);
            }
            other => panic!("expected ToolNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_flatten_text_content() {
        let result = CallToolResult::success(vec![
            Content::text("hello"),
            Content::text("world"),
        ]);
        assert_eq!(flatten_text_content(&result), "hello\nworld");
    }

    #[test]
    fn test_flatten_empty_content() {
        let result = CallToolResult::success(vec![]);
        assert_eq!(flatten_text_content(&result), "");
    }
}

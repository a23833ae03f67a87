//! Client-side handler for upstream MCP server notifications.
//!
//! Upstream servers may push progress, log messages, and list-changed
//! notifications at any time; all of them are folded into our own logs.
//! Re-discovery stays operator-driven, so list-changed notifications are
//! recorded but do not trigger a refresh.

use rmcp::{
    model::{
        CancelledNotificationParam, ClientInfo, LoggingLevel, LoggingMessageNotificationParam,
        ProgressNotificationParam, ResourceUpdatedNotificationParam,
    },
    service::NotificationContext,
    ClientHandler, RoleClient,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct GateClientHandler {
    server_name: Arc<str>,
    client_info: ClientInfo,
}

impl GateClientHandler {
    pub fn new(server_name: impl AsRef<str>) -> Self {
        let mut client_info = ClientInfo::default();
        client_info.client_info.name = "toolgate".to_string();
        client_info.client_info.version = env!("CARGO_PKG_VERSION").to_string();

        Self {
            server_name: Arc::from(server_name.as_ref()),
            client_info,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl ClientHandler for GateClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.client_info.clone()
    }

    async fn on_cancelled(
        &self,
        params: CancelledNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        info!(
            server = %self.server_name,
            request_id = %params.request_id,
            reason = ?params.reason,
            "upstream cancelled request"
        );
    }

    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(
            server = %self.server_name,
            token = ?params.progress_token,
            progress = %params.progress,
            total = ?params.total,
            "upstream progress"
        );
    }

    async fn on_resource_updated(
        &self,
        params: ResourceUpdatedNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        debug!(server = %self.server_name, uri = %params.uri, "upstream resource updated");
    }

    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        info!(
            server = %self.server_name,
            "upstream tool list changed; run refresh_tool_index to pick it up"
        );
    }

    async fn on_resource_list_changed(&self, _context: NotificationContext<RoleClient>) {
        debug!(server = %self.server_name, "upstream resource list changed");
    }

    async fn on_prompt_list_changed(&self, _context: NotificationContext<RoleClient>) {
        debug!(server = %self.server_name, "upstream prompt list changed");
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let logger = params.logger.as_deref().unwrap_or("mcp");
        match params.level {
            LoggingLevel::Emergency
            | LoggingLevel::Alert
            | LoggingLevel::Critical
            | LoggingLevel::Error => {
                error!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
            LoggingLevel::Warning => {
                warn!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
            LoggingLevel::Notice | LoggingLevel::Info => {
                info!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
            LoggingLevel::Debug => {
                debug!(server = %self.server_name, logger = %logger, "upstream: {}", params.data);
            }
        }
    }
}

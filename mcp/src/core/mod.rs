//! Upstream MCP client infrastructure.

pub mod config;
pub mod handler;
pub mod session;
pub mod supervisor;

pub use config::{UpstreamConfig, UpstreamServerConfig, UpstreamTransport};
pub use handler::GateClientHandler;
pub use session::{flatten_text_content, SessionState, UpstreamSession};
pub use supervisor::Supervisor;

//! Upstream MCP session supervision for the toolgate gateway.
//!
//! ## Modules
//!
//! - [`core`]: upstream configuration, per-server sessions, the supervisor
//! - [`inventory`]: tool descriptor types shared with the gateway's index
//!
//! A [`core::Supervisor`] owns one [`core::UpstreamSession`] per configured
//! server; sessions talk MCP over child-process stdio, SSE, or streamable
//! HTTP and cache the tools they discover.

pub mod core;
pub mod error;
pub mod inventory;

pub use core::{
    flatten_text_content, GateClientHandler, SessionState, Supervisor, UpstreamConfig,
    UpstreamServerConfig, UpstreamSession, UpstreamTransport,
};
pub use error::{UpstreamError, UpstreamResult};
pub use inventory::{parameters_from_schema, Parameter, QualifiedToolName, ToolDescriptor};

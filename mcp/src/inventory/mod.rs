//! Tool metadata shared across the gateway.

mod types;

pub use types::{parameters_from_schema, Parameter, QualifiedToolName, ToolDescriptor};

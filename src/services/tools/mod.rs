//! The MCP-style tool surface: a declarative registry of callable tools
//! backed by the query/service layer, dispatched through a uniform
//! success/failure envelope.

pub mod dispatch;
pub mod handlers;
pub mod queries;
pub mod registry;

pub use dispatch::{dispatch, Envelope};
pub use registry::{build_registry, ToolRegistry};

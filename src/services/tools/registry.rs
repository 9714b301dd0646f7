//! Tool registry: a process-wide mapping from tool name to handler, each
//! declaring its own parameter schema.
//!
//! Registration is explicit: each `handlers::*::specs()` function returns
//! its tools' definitions, and [`build_registry`] is called once from
//! `AppState::new` and collects them into one map.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::AppState;

use super::dispatch::ValidatedArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

/// One declared parameter of a tool: `(name, type, required, default, description)`.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

/// The wire shape of one row of `GET /mcp/tools`.
#[derive(Debug, Serialize)]
pub struct ToolCatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub parameters: Vec<ParamCatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct ParamCatalogEntry {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl From<&ToolSpec> for ToolCatalogEntry {
    fn from(spec: &ToolSpec) -> Self {
        ToolCatalogEntry {
            name: spec.name,
            description: spec.description,
            category: spec.category,
            parameters: spec
                .params
                .iter()
                .map(|p| ParamCatalogEntry {
                    name: p.name,
                    param_type: p.param_type.as_str(),
                    required: p.required,
                    default: p.default.clone(),
                    description: p.description,
                })
                .collect(),
        }
    }
}

pub type HandlerFut<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;
pub type HandlerFn = for<'a> fn(&'a AppState, ValidatedArgs) -> HandlerFut<'a>;

pub struct ToolRegistry {
    tools: HashMap<&'static str, (ToolSpec, HandlerFn)>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<(&ToolSpec, HandlerFn)> {
        self.tools.get(name).map(|(spec, handler)| (spec, *handler))
    }

    /// Enumerable catalog for `GET /mcp/tools`, ordered by name for a stable
    /// response.
    pub fn catalog(&self) -> Vec<ToolCatalogEntry> {
        let mut specs: Vec<&ToolSpec> = self.tools.values().map(|(spec, _)| spec).collect();
        specs.sort_by_key(|s| s.name);
        specs.into_iter().map(ToolCatalogEntry::from).collect()
    }
}

/// Collects every handler module's declared tools into one registry. Called
/// once at startup; panics on a duplicate tool name, which is a programming
/// error, not a runtime condition.
pub fn build_registry() -> ToolRegistry {
    let mut tools = HashMap::new();
    for (spec, handler) in super::handlers::history::specs()
        .into_iter()
        .chain(super::handlers::spotify::specs())
        .chain(super::handlers::ops::specs())
    {
        let name = spec.name;
        if tools.insert(name, (spec, handler)).is_some() {
            panic!("duplicate tool registration: {name}");
        }
    }
    ToolRegistry { tools }
}

//! Argument validation/coercion and the success/failure envelope. Validates
//! once at the boundary and hands the handler a typed view, over an untyped
//! `serde_json::Value` args map since tool args arrive as a loosely typed
//! key-value record rather than a fixed request DTO.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::AppState;

use super::registry::{ParamSpec, ParamType, ToolRegistry, ToolSpec};

/// Args after schema validation and type coercion: every required param is
/// present, every declared param has the type its spec demands, defaults
/// have been applied for omitted optional params.
pub struct ValidatedArgs(HashMap<String, Value>);

impl ValidatedArgs {
    pub fn str(&self, name: &str) -> Result<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidArgument(format!("missing argument '{name}'")))
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid> {
        let raw = self.str(name)?;
        Uuid::parse_str(raw)
            .map_err(|_| AppError::InvalidArgument(format!("argument '{name}' is not a valid UUID: '{raw}'")))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.0
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::InvalidArgument(format!("missing argument '{name}'")))
    }

    pub fn optional_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        self.0
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| AppError::InvalidArgument(format!("missing argument '{name}'")))
    }
}

/// Validates `raw` against `spec.params`: required-ness, type coercion
/// (numeric strings are accepted for integer params, since many clients
/// send everything as JSON strings), and default substitution for omitted
/// optional params. Unknown keys in `raw` are ignored.
pub fn validate(spec: &ToolSpec, raw: Value) -> Result<ValidatedArgs> {
    let obj: Map<String, Value> = match raw {
        Value::Object(m) => m,
        Value::Null => Map::new(),
        other => {
            return Err(AppError::InvalidArgument(format!(
                "tool arguments must be a JSON object, got {other}"
            )))
        }
    };

    let mut out = HashMap::with_capacity(spec.params.len());
    for param in &spec.params {
        let provided = obj.get(param.name).cloned();
        let value = match provided.or_else(|| param.default.clone()) {
            Some(v) => v,
            None if param.required => {
                return Err(AppError::InvalidArgument(format!(
                    "missing required argument '{}'",
                    param.name
                )))
            }
            None => continue,
        };
        out.insert(param.name.to_string(), coerce(param, value)?);
    }
    Ok(ValidatedArgs(out))
}

fn coerce(param: &ParamSpec, value: Value) -> Result<Value> {
    let bad = || {
        AppError::InvalidArgument(format!(
            "argument '{}' must be a {}",
            param.name,
            param.param_type.as_str()
        ))
    };
    match param.param_type {
        ParamType::String => match value {
            Value::String(_) => Ok(value),
            _ => Err(bad()),
        },
        ParamType::Integer => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| bad()),
            _ => Err(bad()),
        },
        ParamType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
    }
}

/// The wire-visible envelope every tool invocation returns: exactly one of
/// `{success=true, result}` or `{success=false, error}` ever holds.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub tool: String,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Envelope {
    fn success(tool: &str, result: Value) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(tool: &str, err: AppError) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            result: None,
            error: Some(err.envelope_message()),
        }
    }
}

/// Dispatches one tool call end-to-end: lookup, arg validation, invocation.
/// Every failure path (unknown tool, bad args, handler error) is caught here
/// and converted to the failure envelope; nothing ever propagates as an HTTP
/// error for a recognized `POST /mcp/call` request.
pub async fn dispatch(state: &AppState, registry: &ToolRegistry, tool: &str, args: Value) -> Envelope {
    let Some((spec, handler)) = registry.get(tool) else {
        return Envelope::failure(tool, AppError::NotFound(format!("unknown tool '{tool}'")));
    };

    let validated = match validate(spec, args) {
        Ok(v) => v,
        Err(err) => return Envelope::failure(tool, err),
    };

    match handler(state, validated).await {
        Ok(result) => Envelope::success(tool, result),
        Err(err) => Envelope::failure(tool, err),
    }
}

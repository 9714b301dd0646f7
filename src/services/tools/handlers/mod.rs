pub mod history;
pub mod ops;
pub mod spotify;

use serde_json::Value;

use crate::error::AppError;

/// Shared `Serialize -> Value` conversion for handlers; a serialization
/// failure here means a handler built a type that can't round-trip through
/// `serde_json`, which is a programming error, not a caller-facing one.
pub(super) fn to_value<T: serde::Serialize>(value: T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("failed to serialize tool result: {e}")))
}

use crate::backend::CallOptions;
use crate::mcp::contracts::MAX_TIMEOUT_MS;
use crate::mcp::errors;
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InputError {
    pub kind: &'static str,
    pub message: String,
}

impl InputError {
    fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: errors::INVALID_INPUT,
            message: message.into(),
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for InputError {}

pub fn arguments_object(args: &Value) -> Result<&Map<String, Value>, InputError> {
    args.as_object()
        .ok_or_else(|| InputError::invalid_input("arguments must be an object"))
}

/// A string argument that must be present. Empty strings are allowed.
pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, InputError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(InputError::invalid_input(format!("{key} is required"))),
        Some(value) => value
            .as_str()
            .ok_or_else(|| InputError::invalid_input(format!("{key} must be a string"))),
    }
}

/// Same as [`required_str`] but rejects blank values.
pub fn required_id<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, InputError> {
    let value = required_str(args, key)?;
    if value.trim().is_empty() {
        return Err(InputError::invalid_input(format!("{key} must not be empty")));
    }
    Ok(value)
}

pub fn optional_str<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, InputError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| InputError::invalid_input(format!("{key} must be a string"))),
    }
}

/// A positive integer argument.
pub fn optional_positive(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, InputError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(0) | None => Err(InputError::invalid_input(format!(
                "{key} must be a positive integer"
            ))),
            Some(number) => Ok(Some(number)),
        },
    }
}

pub fn optional_usize(args: &Map<String, Value>, key: &str) -> Result<Option<usize>, InputError> {
    optional_positive(args, key)?
        .map(|number| {
            usize::try_from(number)
                .map_err(|_| InputError::invalid_input(format!("{key} is too large")))
        })
        .transpose()
}

/// The `arguments` mapping forwarded to the backend; `{}` when absent.
pub fn forwarded_arguments(args: &Map<String, Value>) -> Result<Value, InputError> {
    match args.get("arguments") {
        None | Some(Value::Null) => Ok(json!({})),
        Some(value @ Value::Object(_)) => Ok(value.clone()),
        Some(_) => Err(InputError::invalid_input("arguments must be an object")),
    }
}

/// Forward options built from `timeout_ms`.
pub fn call_options(args: &Map<String, Value>) -> Result<CallOptions, InputError> {
    let Some(timeout_ms) = optional_positive(args, "timeout_ms")? else {
        return Ok(CallOptions::default());
    };
    if timeout_ms > MAX_TIMEOUT_MS {
        return Err(InputError::invalid_input(format!(
            "timeout_ms exceeds limit: {timeout_ms} (max {MAX_TIMEOUT_MS})"
        )));
    }
    Ok(CallOptions::with_timeout(Duration::from_millis(timeout_ms)))
}

//! Shared deterministic types for kernel core logic.
//!
//! These types define stable contracts between the kernel, the runtime engine,
//! and modules. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::taxonomy::ErrorCode;

/// One argument a command accepts. Used for introspection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    /// Open-ended type tag (`string`, `int`, `path`, `json`, ...).
    #[serde(rename = "type")]
    pub arg_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl ArgSpec {
    pub fn new(name: &str, arg_type: &str, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            arg_type: arg_type.to_string(),
            required,
            description: description.to_string(),
        }
    }
}

/// One invocable operation offered by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

impl CommandSpec {
    pub fn new(command_id: &str, description: &str, args: Vec<ArgSpec>) -> Self {
        Self {
            command_id: command_id.to_string(),
            description: description.to_string(),
            args,
        }
    }
}

/// Optional payload attached to an error.
///
/// Absence is modeled by `Option::None` at the use site. `result.json` stores
/// details as JSON, so a `Structured` string reads back as `Text` and a
/// `Structured` null reads back as absent; [`ErrorDetails::target`] treats
/// both pairs alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    Text(String),
    Structured(Value),
}

impl ErrorDetails {
    /// Remediation target text, or `None` for a null payload.
    pub fn target(&self) -> Option<String> {
        match self {
            ErrorDetails::Structured(Value::Null) => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetails::Text(text) | ErrorDetails::Structured(Value::String(text)) => {
                f.write_str(text)
            }
            ErrorDetails::Structured(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for ErrorDetails {
    fn from(text: &str) -> Self {
        ErrorDetails::Text(text.to_string())
    }
}

impl From<String> for ErrorDetails {
    fn from(text: String) -> Self {
        ErrorDetails::Text(text)
    }
}

impl From<Value> for ErrorDetails {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => ErrorDetails::Text(text),
            other => ErrorDetails::Structured(other),
        }
    }
}

/// Structured, expected failure reported by a module or the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<ErrorDetails>,
}

impl RuntimeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<ErrorDetails>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn unknown_command(command_id: &str) -> Self {
        Self::new(ErrorCode::UnknownCommand, command_id)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

/// Outcome of one dispatch.
///
/// Well-formed results have `ok == true` with no error, or `ok == false` with
/// an error. Modules can still hand back `ok == false` without an error; the
/// classifier treats that as an invalid run rather than a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub ok: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<RuntimeError>,
}

impl RuntimeResult {
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            ok: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn fail(error: RuntimeError) -> Self {
        Self {
            ok: false,
            output: None,
            error: Some(error),
        }
    }
}

/// Terminal classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// The command completed.
    Success,
    /// An external actor must act (provide a file, install a tool) before retrying.
    Blocked,
    /// The caller must change the input.
    Invalid,
}

impl RunState {
    /// Lowercase wire name used in `resolution.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Success => "success",
            RunState::Blocked => "blocked",
            RunState::Invalid => "invalid",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Success => "Success",
            RunState::Blocked => "Blocked",
            RunState::Invalid => "Invalid",
        };
        f.write_str(label)
    }
}

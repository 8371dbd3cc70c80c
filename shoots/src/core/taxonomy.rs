//! Error codes and their fixed classification.
//!
//! The code space is open (modules may report any string) but classification
//! is closed: every code without an explicit row falls through to the
//! `Invalid` / `fix_input` default.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{ErrorDetails, RunState, RuntimeError};

/// Target used by the default remediation row.
pub const COMMAND_ARGUMENTS_TARGET: &str = "command_arguments";
/// Target used when a blocking error carries no details.
pub const UNKNOWN_TARGET: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    MissingFile,
    PermissionDenied,
    ToolNotFound,
    UnknownCommand,
    Internal,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::MissingFile => "missing_file",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::ToolNotFound => "tool_not_found",
            ErrorCode::UnknownCommand => "unknown_command",
            ErrorCode::Internal => "internal",
            ErrorCode::Other(code) => code,
        }
    }

    /// Remediation row for this code.
    pub fn remediation(&self) -> Remediation {
        match self {
            ErrorCode::MissingFile => Remediation {
                state: RunState::Blocked,
                actor: Actor::User,
                action: Action::ProvideFile,
                target: TargetSource::Details,
            },
            ErrorCode::PermissionDenied => Remediation {
                state: RunState::Blocked,
                actor: Actor::System,
                action: Action::GrantPermission,
                target: TargetSource::Details,
            },
            ErrorCode::ToolNotFound => Remediation {
                state: RunState::Blocked,
                actor: Actor::System,
                action: Action::InstallTool,
                target: TargetSource::Details,
            },
            ErrorCode::UnknownCommand | ErrorCode::Internal | ErrorCode::Other(_) => Remediation {
                state: RunState::Invalid,
                actor: Actor::User,
                action: Action::FixInput,
                target: TargetSource::Literal(COMMAND_ARGUMENTS_TARGET),
            },
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "missing_file" => ErrorCode::MissingFile,
            "permission_denied" => ErrorCode::PermissionDenied,
            "tool_not_found" => ErrorCode::ToolNotFound,
            "unknown_command" => ErrorCode::UnknownCommand,
            "internal" => ErrorCode::Internal,
            _ => ErrorCode::Other(code),
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        ErrorCode::from(code.to_string())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who has to act before a retry is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ProvideFile,
    GrantPermission,
    InstallTool,
    FixInput,
}

/// Where the remediation target string comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    /// Stringified `error.details`, or [`UNKNOWN_TARGET`] when absent.
    Details,
    Literal(&'static str),
}

/// One row of the taxonomy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remediation {
    pub state: RunState,
    pub actor: Actor,
    pub action: Action,
    pub target: TargetSource,
}

/// A concrete step an actor must take, as persisted in `resolution.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAction {
    pub actor: Actor,
    pub action: Action,
    pub target: String,
}

impl Remediation {
    /// Render this row against a concrete error.
    pub fn required_action(&self, error: &RuntimeError) -> RequiredAction {
        let target = match self.target {
            TargetSource::Details => error
                .details
                .as_ref()
                .and_then(ErrorDetails::target)
                .unwrap_or_else(|| UNKNOWN_TARGET.to_string()),
            TargetSource::Literal(literal) => literal.to_string(),
        };
        RequiredAction {
            actor: self.actor,
            action: self.action,
            target,
        }
    }
}

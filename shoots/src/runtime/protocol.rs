//! Request and context value types passed to modules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::types::CommandSpec;

/// Read-only lookups the runtime exposes to modules and the helper.
pub trait RuntimeServices: Send + Sync {
    fn get_command(&self, command_id: &str) -> Option<CommandSpec>;

    /// All known commands in registration order.
    fn get_all_commands(&self) -> Vec<CommandSpec>;
}

/// Per-run context. Created fresh for every top-level run.
#[derive(Clone)]
pub struct RuntimeContext {
    /// Content hash of the plan.
    pub session_id: String,
    /// Random per-run token. Never part of any hash input.
    pub correlation_id: String,
    /// Caller-provided environment, passed through to modules untouched.
    pub env: BTreeMap<String, String>,
    pub services: Arc<dyn RuntimeServices>,
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("session_id", &self.session_id)
            .field("correlation_id", &self.correlation_id)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeRequest {
    pub command_id: String,
    pub args: BTreeMap<String, Value>,
    pub context: RuntimeContext,
}

impl RuntimeRequest {
    pub fn new(command_id: impl Into<String>, context: RuntimeContext) -> Self {
        Self {
            command_id: command_id.into(),
            args: BTreeMap::new(),
            context,
        }
    }
}

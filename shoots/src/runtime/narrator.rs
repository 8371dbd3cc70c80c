//! Observation hooks invoked around one dispatch.
//!
//! Narrators are side-effecting sinks. They see the request and result by
//! shared reference only, and a failing callback is logged by the engine and
//! otherwise ignored.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::core::types::{CommandSpec, RuntimeError, RuntimeResult};
use crate::runtime::protocol::RuntimeRequest;

/// Destination for formatted output lines. A write error is reported back to
/// the caller and never aborts a run.
pub type LineSink = Arc<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

/// Called in order: `on_plan`, `on_command` (module dispatch only),
/// `on_result`, then `on_error` when the result carries an error.
pub trait Narrator: Send + Sync {
    fn on_plan(&self, plan_text: &str) -> Result<()>;

    fn on_command(&self, command: &CommandSpec, request: &RuntimeRequest) -> Result<()>;

    fn on_result(&self, result: &RuntimeResult) -> Result<()>;

    fn on_error(&self, error: &RuntimeError) -> Result<()>;
}

/// Narrator that renders one human-readable line per event.
pub struct TextNarrator {
    sink: LineSink,
}

impl TextNarrator {
    pub fn new(sink: LineSink) -> Self {
        Self { sink }
    }

    fn emit(&self, line: &str) -> io::Result<()> {
        (self.sink)(line)
    }
}

impl Narrator for TextNarrator {
    fn on_plan(&self, plan_text: &str) -> Result<()> {
        self.emit(&format!("[plan] {plan_text}"))?;
        Ok(())
    }

    fn on_command(&self, command: &CommandSpec, request: &RuntimeRequest) -> Result<()> {
        self.emit(&format!(
            "[command] {} args={}",
            command.command_id,
            format_args_map(request)
        ))?;
        Ok(())
    }

    fn on_result(&self, result: &RuntimeResult) -> Result<()> {
        match (result.ok, &result.error) {
            (true, _) => self.emit("[result] ok")?,
            (false, Some(error)) => self.emit(&format!("[result] failed ({})", error.code))?,
            (false, None) => self.emit("[result] failed")?,
        }
        Ok(())
    }

    fn on_error(&self, error: &RuntimeError) -> Result<()> {
        self.emit(&format!("[error] {}: {}", error.code, error.message))?;
        Ok(())
    }
}

fn format_args_map(request: &RuntimeRequest) -> String {
    if request.args.is_empty() {
        return "{}".to_string();
    }
    let pairs: Vec<String> = request
        .args
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect();
    format!("{{ {} }}", pairs.join(", "))
}

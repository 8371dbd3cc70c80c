//! Metadata-only help derived from the registered command catalogue.

use serde_json::{Value, json};

use crate::core::types::{CommandSpec, RuntimeResult};
use crate::runtime::protocol::RuntimeRequest;

/// Answers introspection requests instead of a module.
pub trait Helper: Send + Sync {
    fn help(&self, request: &RuntimeRequest) -> RuntimeResult;
}

/// Stateless helper: a pure function of the services' command catalogue.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicHelper;

impl Helper for DeterministicHelper {
    /// Describe `request.command_id` when it names a known command,
    /// otherwise list every command.
    fn help(&self, request: &RuntimeRequest) -> RuntimeResult {
        let services = &request.context.services;
        let topic = request.command_id.trim();
        if !topic.is_empty()
            && let Some(spec) = services.get_command(topic)
        {
            return RuntimeResult::success(describe_command(&spec));
        }

        let mut commands: Vec<String> = services
            .get_all_commands()
            .into_iter()
            .map(|spec| spec.command_id)
            .collect();
        commands.sort_by(|a, b| {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        });
        let count = commands.len();
        RuntimeResult::success(json!({ "commands": commands, "count": count }))
    }
}

fn describe_command(spec: &CommandSpec) -> Value {
    let args: Vec<Value> = spec
        .args
        .iter()
        .map(|arg| {
            json!({
                "name": arg.name,
                "type": arg.arg_type,
                "required": arg.required,
                "description": arg.description,
            })
        })
        .collect();
    json!({
        "commandId": spec.command_id,
        "description": spec.description,
        "args": args,
        "usage": usage_line(spec),
        "examples": example_lines(spec),
    })
}

/// `cmd name=<type> [opt=<type>]`, arguments in declaration order.
pub fn usage_line(spec: &CommandSpec) -> String {
    let mut parts = vec![spec.command_id.clone()];
    for arg in &spec.args {
        let token = format!("{}=<{}>", arg.name, arg.arg_type);
        parts.push(if arg.required {
            token
        } else {
            format!("[{token}]")
        });
    }
    parts.join(" ")
}

pub fn example_lines(spec: &CommandSpec) -> Vec<String> {
    if spec.args.is_empty() {
        return vec![spec.command_id.clone()];
    }
    let assignments: Vec<String> = spec
        .args
        .iter()
        .map(|arg| format!("{}={}", arg.name, example_value(&arg.arg_type)))
        .collect();
    vec![format!("{} {}", spec.command_id, assignments.join(" "))]
}

fn example_value(arg_type: &str) -> &'static str {
    match arg_type {
        "int" => "123",
        "path" => "/path/to/file",
        "json" => "{...}",
        _ => "value",
    }
}

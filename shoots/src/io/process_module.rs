//! Modules backed by an external executable.
//!
//! The request is written to the child's stdin as one JSON object and the
//! child answers with one `RuntimeResult` JSON object on stdout. Spawn
//! failures, timeouts, cancellation and undecodable output are expected
//! failures and come back as failed results, not faults.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::taxonomy::ErrorCode;
use crate::core::types::{CommandSpec, RuntimeError, RuntimeResult};
use crate::core::version::ModuleVersion;
use crate::io::process::{CommandOutput, run_command};
use crate::runtime::module::{CancellationSignal, Module};
use crate::runtime::protocol::RuntimeRequest;

/// Bytes of stderr quoted in an undecodable-output error.
const STDERR_EXCERPT_BYTES: usize = 400;

/// Contents of `<module dir>/module.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleManifest {
    pub module_id: String,
    pub version: ModuleVersion,
    pub min_runtime_version: ModuleVersion,
    pub max_runtime_version: ModuleVersion,
    /// argv; the program is resolved against the module directory first.
    pub command: Vec<String>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

impl ModuleManifest {
    pub fn validate(&self) -> Result<()> {
        if self.module_id.trim().is_empty() {
            return Err(anyhow!("module_id must not be empty"));
        }
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("command must be a non-empty array"));
        }
        if self.min_runtime_version > self.max_runtime_version {
            return Err(anyhow!(
                "min_runtime_version {} exceeds max_runtime_version {}",
                self.min_runtime_version,
                self.max_runtime_version
            ));
        }
        if let Some(spec) = self.commands.iter().find(|c| c.command_id.trim().is_empty()) {
            return Err(anyhow!("command with empty command_id ({:?})", spec.description));
        }
        Ok(())
    }
}

/// Limits applied to every process-module invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    command_id: &'a str,
    args: &'a BTreeMap<String, Value>,
    context: WireContext<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireContext<'a> {
    session_id: &'a str,
    correlation_id: &'a str,
    env: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ProcessModule {
    manifest: ModuleManifest,
    dir: PathBuf,
    limits: ProcessLimits,
}

impl ProcessModule {
    pub fn new(manifest: ModuleManifest, dir: &Path, limits: ProcessLimits) -> Self {
        Self {
            manifest,
            dir: dir.to_path_buf(),
            limits,
        }
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    fn program(&self) -> PathBuf {
        let program = Path::new(&self.manifest.command[0]);
        let local = self.dir.join(program);
        if program.is_relative() && local.is_file() {
            local
        } else {
            program.to_path_buf()
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(&self.manifest.command[1..]).current_dir(&self.dir);
        cmd
    }

    fn encode_request(request: &RuntimeRequest) -> Result<Vec<u8>> {
        let wire = WireRequest {
            command_id: &request.command_id,
            args: &request.args,
            context: WireContext {
                session_id: &request.context.session_id,
                correlation_id: &request.context.correlation_id,
                env: &request.context.env,
            },
        };
        serde_json::to_vec(&wire).context("encode module request")
    }

    fn spawn_failure(&self, err: anyhow::Error) -> Result<RuntimeResult> {
        let program = self.manifest.command[0].clone();
        let Some(io_err) = err.downcast_ref::<std::io::Error>() else {
            return Err(err);
        };
        let code = match io_err.kind() {
            ErrorKind::NotFound => ErrorCode::ToolNotFound,
            ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => return Err(err).with_context(|| format!("run module {}", self.manifest.module_id)),
        };
        warn!(module_id = %self.manifest.module_id, %program, %code, "module program could not start");
        Ok(RuntimeResult::fail(
            RuntimeError::new(code, format!("cannot start '{program}': {io_err}"))
                .with_details(program),
        ))
    }

    fn decode_output(&self, output: &CommandOutput) -> RuntimeResult {
        if output.cancelled {
            return RuntimeResult::fail(RuntimeError::internal(format!(
                "module {} cancelled",
                self.manifest.module_id
            )));
        }
        if output.timed_out {
            return RuntimeResult::fail(RuntimeError::internal(format!(
                "module {} timed out after {:?}",
                self.manifest.module_id,
                self.limits.timeout
            )));
        }
        match serde_json::from_slice::<RuntimeResult>(&output.stdout) {
            Ok(result) => result,
            Err(err) => {
                let mut stderr = output.stderr_text();
                if stderr.len() > STDERR_EXCERPT_BYTES {
                    let mut cut = STDERR_EXCERPT_BYTES;
                    while !stderr.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    stderr.truncate(cut);
                }
                RuntimeResult::fail(
                    RuntimeError::internal(format!(
                        "module {} produced undecodable output (exit {:?}): {err}",
                        self.manifest.module_id,
                        output.status.code()
                    ))
                    .with_details(stderr.trim().to_string()),
                )
            }
        }
    }
}

impl Module for ProcessModule {
    fn module_id(&self) -> &str {
        &self.manifest.module_id
    }

    fn module_version(&self) -> ModuleVersion {
        self.manifest.version
    }

    fn min_runtime_version(&self) -> ModuleVersion {
        self.manifest.min_runtime_version
    }

    fn max_runtime_version(&self) -> ModuleVersion {
        self.manifest.max_runtime_version
    }

    fn describe(&self) -> Vec<CommandSpec> {
        self.manifest.commands.clone()
    }

    #[instrument(skip_all, fields(module_id = %self.manifest.module_id, command_id = %request.command_id))]
    fn execute(
        &self,
        request: &RuntimeRequest,
        cancel: &CancellationSignal,
    ) -> Result<RuntimeResult> {
        let input = Self::encode_request(request)?;
        let output = match run_command(
            self.build_command(),
            Some(input.as_slice()),
            self.limits.timeout,
            self.limits.output_limit_bytes,
            cancel,
        ) {
            Ok(output) => output,
            Err(err) => return self.spawn_failure(err),
        };
        debug!(exit_code = ?output.status.code(), "module process finished");
        Ok(self.decode_output(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_toml() -> &'static str {
        r#"
module_id = "fs"
version = "0.3.1"
min_runtime_version = "1.0.0"
max_runtime_version = "1.9.0"
command = ["sh", "run.sh"]

[[commands]]
command_id = "fs.read"
description = "Read a file"

[[commands.args]]
name = "path"
type = "path"
required = true
description = "File to read"
"#
    }

    #[test]
    fn manifest_parses_catalogue() {
        let manifest: ModuleManifest = toml::from_str(manifest_toml()).expect("parse");
        manifest.validate().expect("valid");
        assert_eq!(manifest.version, ModuleVersion::new(0, 3, 1));
        assert_eq!(manifest.commands.len(), 1);
        assert_eq!(manifest.commands[0].args[0].arg_type, "path");
        assert!(manifest.commands[0].args[0].required);
    }

    #[test]
    fn manifest_rejects_inverted_range_and_empty_command() {
        let mut manifest: ModuleManifest = toml::from_str(manifest_toml()).expect("parse");
        manifest.min_runtime_version = ModuleVersion::new(2, 0, 0);
        assert!(manifest.validate().is_err());

        let mut manifest: ModuleManifest = toml::from_str(manifest_toml()).expect("parse");
        manifest.command.clear();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn manifest_rejects_unknown_fields() {
        let raw = format!("entrypoint = \"x\"\n{}", manifest_toml());
        assert!(toml::from_str::<ModuleManifest>(&raw).is_err());
    }

    #[test]
    fn wire_request_uses_camel_case() {
        use crate::runtime::protocol::RuntimeContext;
        use crate::runtime::registry::ModuleRegistry;
        use std::sync::Arc;

        let mut env = BTreeMap::new();
        env.insert("PROFILE".to_string(), "ci".to_string());
        let mut request = RuntimeRequest::new(
            "fs.read",
            RuntimeContext {
                session_id: "abc".to_string(),
                correlation_id: "def".to_string(),
                env,
                services: Arc::new(ModuleRegistry::build(
                    crate::HOST_RUNTIME_VERSION,
                    Vec::new(),
                )),
            },
        );
        request
            .args
            .insert("path".to_string(), Value::String("/tmp/x".to_string()));

        let bytes = ProcessModule::encode_request(&request).expect("encode");
        let value: Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(
            value,
            serde_json::json!({
                "commandId": "fs.read",
                "args": {"path": "/tmp/x"},
                "context": {"sessionId": "abc", "correlationId": "def", "env": {"PROFILE": "ci"}}
            })
        );
    }
}

//! Test-only modules and sinks with deterministic, inspectable behavior.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};

use crate::core::types::{CommandSpec, RuntimeResult};
use crate::core::version::ModuleVersion;
use crate::runtime::module::{CancellationSignal, Module, ModuleHandle};
use crate::runtime::narrator::LineSink;
use crate::runtime::protocol::RuntimeRequest;

#[derive(Debug, Clone)]
enum Behavior {
    Respond(RuntimeResult),
    Fault(String),
}

/// In-process module whose catalogue and answers are fixed up front.
///
/// Commands without a scripted answer succeed with output `"ok"`. Every
/// executed command id is recorded and available through [`calls`].
///
/// [`calls`]: ScriptedModule::calls
#[derive(Debug)]
pub struct ScriptedModule {
    module_id: String,
    version: ModuleVersion,
    min_runtime: ModuleVersion,
    max_runtime: ModuleVersion,
    specs: Vec<CommandSpec>,
    behaviors: BTreeMap<String, Behavior>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModule {
    pub fn new(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            version: ModuleVersion::new(1, 0, 0),
            min_runtime: ModuleVersion::new(1, 0, 0),
            max_runtime: ModuleVersion::new(1, 9, 0),
            specs: Vec::new(),
            behaviors: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_commands(mut self, command_ids: &[&str]) -> Self {
        for id in command_ids {
            self.specs
                .push(CommandSpec::new(id, &format!("{id} command"), Vec::new()));
        }
        self
    }

    pub fn with_specs(mut self, specs: Vec<CommandSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn with_version(mut self, version: ModuleVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_runtime_range(mut self, min: ModuleVersion, max: ModuleVersion) -> Self {
        self.min_runtime = min;
        self.max_runtime = max;
        self
    }

    /// Answer `command_id` with `result`, declaring the command if needed.
    pub fn with_result(mut self, command_id: &str, result: RuntimeResult) -> Self {
        self.declare(command_id);
        self.behaviors
            .insert(command_id.to_string(), Behavior::Respond(result));
        self
    }

    /// Fail `command_id` with a fatal fault, declaring the command if needed.
    pub fn with_fault(mut self, command_id: &str, message: &str) -> Self {
        self.declare(command_id);
        self.behaviors
            .insert(command_id.to_string(), Behavior::Fault(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn declare(&mut self, command_id: &str) {
        if !self.specs.iter().any(|spec| spec.command_id == command_id) {
            self.specs.push(CommandSpec::new(
                command_id,
                &format!("{command_id} command"),
                Vec::new(),
            ));
        }
    }
}

impl Module for ScriptedModule {
    fn module_id(&self) -> &str {
        &self.module_id
    }

    fn module_version(&self) -> ModuleVersion {
        self.version
    }

    fn min_runtime_version(&self) -> ModuleVersion {
        self.min_runtime
    }

    fn max_runtime_version(&self) -> ModuleVersion {
        self.max_runtime
    }

    fn describe(&self) -> Vec<CommandSpec> {
        self.specs.clone()
    }

    fn execute(
        &self,
        request: &RuntimeRequest,
        _cancel: &CancellationSignal,
    ) -> Result<RuntimeResult> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.command_id.clone());
        match self.behaviors.get(&request.command_id) {
            Some(Behavior::Respond(result)) => Ok(result.clone()),
            Some(Behavior::Fault(message)) => Err(anyhow!(message.clone())),
            None => Ok(RuntimeResult::success("ok")),
        }
    }
}

/// Erase a scripted module into the handle type the registry takes.
pub fn handle(module: ScriptedModule) -> ModuleHandle {
    Arc::new(module)
}

/// Line sink that stores every line for later assertions.
#[derive(Debug, Clone, Default)]
pub struct CapturedLines {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> LineSink {
        let lines = self.lines.clone();
        Arc::new(move |line: &str| -> io::Result<()> {
            lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_string());
            Ok(())
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Line sink whose every write fails, like stdout piped into a closed reader.
pub fn closed_sink() -> LineSink {
    Arc::new(|_: &str| -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    })
}

/// Write `<modules_dir>/<name>/module.toml` plus an optional `run.sh`.
pub fn write_process_module(
    modules_dir: &Path,
    name: &str,
    manifest: &str,
    script: Option<&str>,
) -> Result<PathBuf> {
    let dir = modules_dir.join(name);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("module.toml"), manifest)?;
    if let Some(script) = script {
        fs::write(dir.join("run.sh"), script)?;
    }
    Ok(dir)
}

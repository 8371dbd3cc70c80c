//! Module registry: version gating, command indexing, conflict detection.
//!
//! Built once per run and read-only afterwards. Command conflicts resolve
//! first-loaded-wins and are recorded so callers can assert on them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::core::types::CommandSpec;
use crate::core::version::ModuleVersion;
use crate::runtime::module::{Module, ModuleHandle};
use crate::runtime::protocol::RuntimeServices;

/// Why a loaded module was left out of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Hosting runtime is outside `[min, max]`.
    RuntimeVersionOutOfRange {
        runtime: ModuleVersion,
        min: ModuleVersion,
        max: ModuleVersion,
    },
    /// Another module with the same id was loaded first.
    DuplicateModuleId,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::RuntimeVersionOutOfRange { runtime, min, max } => {
                write!(f, "requires runtime {min}..={max}, host is {runtime}")
            }
            ExclusionReason::DuplicateModuleId => f.write_str("duplicate module id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedModule {
    pub module_id: String,
    pub version: ModuleVersion,
    pub reason: ExclusionReason,
}

/// Two declarations of one command id. The first-loaded module keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConflict {
    pub command_id: String,
    pub kept_module: String,
    pub ignored_module: String,
}

pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    commands: Vec<CommandSpec>,
    /// Command id → (index into `commands`, index into `modules`).
    index: HashMap<String, (usize, usize)>,
    excluded: Vec<ExcludedModule>,
    conflicts: Vec<CommandConflict>,
}

impl ModuleRegistry {
    /// Build the registry from modules in load order.
    #[instrument(skip_all, fields(runtime_version = %runtime_version, loaded = loaded.len()))]
    pub fn build(runtime_version: ModuleVersion, loaded: Vec<ModuleHandle>) -> Self {
        let mut registry = Self {
            modules: Vec::new(),
            commands: Vec::new(),
            index: HashMap::new(),
            excluded: Vec::new(),
            conflicts: Vec::new(),
        };
        let mut module_ids = HashSet::new();

        for module in loaded {
            let module_id = module.module_id().to_string();
            let version = module.module_version();
            let (min, max) = (module.min_runtime_version(), module.max_runtime_version());

            let reason = if !runtime_version.within(min, max) {
                Some(ExclusionReason::RuntimeVersionOutOfRange {
                    runtime: runtime_version,
                    min,
                    max,
                })
            } else if module_ids.contains(&module_id) {
                Some(ExclusionReason::DuplicateModuleId)
            } else {
                None
            };
            if let Some(reason) = reason {
                warn!(module_id = %module_id, %version, %reason, "module excluded");
                registry.excluded.push(ExcludedModule {
                    module_id,
                    version,
                    reason,
                });
                continue;
            }

            module_ids.insert(module_id.clone());
            let module_idx = registry.modules.len();
            registry.index_commands(module_idx, &module_id, module.describe());
            registry.modules.push(module);
            debug!(module_id = %module_id, %version, "module registered");
        }

        info!(
            modules = registry.modules.len(),
            commands = registry.commands.len(),
            excluded = registry.excluded.len(),
            conflicts = registry.conflicts.len(),
            "registry built"
        );
        registry
    }

    fn index_commands(&mut self, module_idx: usize, module_id: &str, specs: Vec<CommandSpec>) {
        for spec in specs {
            if let Some(&(_, owner_idx)) = self.index.get(&spec.command_id) {
                let kept_module = if owner_idx == module_idx {
                    module_id.to_string()
                } else {
                    self.modules[owner_idx].module_id().to_string()
                };
                warn!(
                    command_id = %spec.command_id,
                    kept = %kept_module,
                    ignored = %module_id,
                    "command id conflict; first-loaded module wins"
                );
                self.conflicts.push(CommandConflict {
                    command_id: spec.command_id,
                    kept_module,
                    ignored_module: module_id.to_string(),
                });
                continue;
            }
            self.index
                .insert(spec.command_id.clone(), (self.commands.len(), module_idx));
            self.commands.push(spec);
        }
    }

    pub fn get_command(&self, command_id: &str) -> Option<&CommandSpec> {
        self.index
            .get(command_id)
            .map(|&(command_idx, _)| &self.commands[command_idx])
    }

    /// Commands in registration order.
    pub fn get_all_commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Module owning `command_id`, if any.
    pub fn resolve_module(&self, command_id: &str) -> Option<&dyn Module> {
        self.index
            .get(command_id)
            .map(|&(_, module_idx)| self.modules[module_idx].as_ref())
    }

    /// Registered modules in load order.
    pub fn modules(&self) -> impl Iterator<Item = &dyn Module> {
        self.modules.iter().map(|module| module.as_ref())
    }

    /// Commands owned by `module_id`, in registration order.
    pub fn commands_of(&self, module_id: &str) -> Vec<&CommandSpec> {
        self.commands
            .iter()
            .filter(|spec| {
                self.resolve_module(&spec.command_id)
                    .is_some_and(|module| module.module_id() == module_id)
            })
            .collect()
    }

    pub fn excluded(&self) -> &[ExcludedModule] {
        &self.excluded
    }

    pub fn conflicts(&self) -> &[CommandConflict] {
        &self.conflicts
    }
}

impl RuntimeServices for ModuleRegistry {
    fn get_command(&self, command_id: &str) -> Option<CommandSpec> {
        ModuleRegistry::get_command(self, command_id).cloned()
    }

    fn get_all_commands(&self) -> Vec<CommandSpec> {
        self.commands.clone()
    }
}

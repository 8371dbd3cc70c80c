//! Module discovery.
//!
//! The kernel only ever sees the `Vec<ModuleHandle>` a loader returns; how
//! modules are found is the loader's business.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::io::process_module::{ModuleManifest, ProcessLimits, ProcessModule};
use crate::runtime::module::ModuleHandle;

pub const MANIFEST_FILE: &str = "module.toml";

pub trait ModuleLoader: Send + Sync {
    /// Load modules for `dir`, in the order they should be registered.
    ///
    /// A missing directory is not an error.
    fn load_from_directory(&self, dir: &Path) -> Result<Vec<ModuleHandle>>;
}

/// Returns a fixed list regardless of the directory.
#[derive(Clone, Default)]
pub struct StaticModuleLoader {
    modules: Vec<ModuleHandle>,
}

impl StaticModuleLoader {
    pub fn new(modules: Vec<ModuleHandle>) -> Self {
        Self { modules }
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load_from_directory(&self, _dir: &Path) -> Result<Vec<ModuleHandle>> {
        Ok(self.modules.clone())
    }
}

/// Loads one [`ProcessModule`] per `<dir>/<name>/module.toml`, in lexical
/// order of `<name>`.
#[derive(Debug, Clone)]
pub struct DirectoryModuleLoader {
    limits: ProcessLimits,
}

impl DirectoryModuleLoader {
    pub fn new(limits: ProcessLimits) -> Self {
        Self { limits }
    }

    fn load_one(&self, module_dir: &Path) -> Result<ProcessModule> {
        let manifest_path = module_dir.join(MANIFEST_FILE);
        let contents = fs::read_to_string(&manifest_path)
            .with_context(|| format!("read {}", manifest_path.display()))?;
        let manifest: ModuleManifest = toml::from_str(&contents)
            .with_context(|| format!("parse {}", manifest_path.display()))?;
        manifest
            .validate()
            .with_context(|| format!("validate {}", manifest_path.display()))?;
        Ok(ProcessModule::new(manifest, module_dir, self.limits))
    }
}

impl ModuleLoader for DirectoryModuleLoader {
    #[instrument(skip(self), fields(dir = %dir.display()))]
    fn load_from_directory(&self, dir: &Path) -> Result<Vec<ModuleHandle>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("modules directory missing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err).with_context(|| format!("list {}", dir.display())),
        };

        let mut module_dirs = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("list {}", dir.display()))?;
            let path = entry.path();
            if path.join(MANIFEST_FILE).is_file() {
                module_dirs.push(path);
            }
        }
        module_dirs.sort();

        let mut modules: Vec<ModuleHandle> = Vec::new();
        for module_dir in module_dirs {
            match self.load_one(&module_dir) {
                Ok(module) => {
                    debug!(module_id = %module.manifest().module_id, "process module loaded");
                    modules.push(Arc::new(module));
                }
                Err(err) => {
                    warn!(dir = %module_dir.display(), err = %format!("{err:#}"), "skipping module");
                }
            }
        }
        Ok(modules)
    }
}

/// Concatenates the output of several loaders in order.
#[derive(Default)]
pub struct StackedModuleLoader {
    loaders: Vec<Box<dyn ModuleLoader>>,
}

impl StackedModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }
}

impl ModuleLoader for StackedModuleLoader {
    fn load_from_directory(&self, dir: &Path) -> Result<Vec<ModuleHandle>> {
        let mut modules = Vec::new();
        for loader in &self.loaders {
            modules.extend(loader.load_from_directory(dir)?);
        }
        Ok(modules)
    }
}

//! Kernel configuration stored in `shoots.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::version::ModuleVersion;

pub const DEFAULT_CONFIG_FILE: &str = "shoots.toml";

/// Kernel configuration (TOML).
///
/// Missing fields default to the values the CLI uses out of the box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KernelConfig {
    /// Directory scanned for `<name>/module.toml` manifests.
    pub modules_dir: PathBuf,

    /// Root of the content-addressed artifact store.
    pub artifacts_dir: PathBuf,

    /// Version this host declares to modules for compatibility gating.
    pub runtime_version: ModuleVersion,

    /// Wall-clock budget for one process-module invocation.
    pub module_timeout_secs: u64,

    /// Truncate process-module stdout/stderr beyond this many bytes.
    pub module_output_limit_bytes: usize,

    /// Passed through to modules as `RuntimeContext.env`.
    pub env: BTreeMap<String, String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            artifacts_dir: PathBuf::from("artifacts"),
            runtime_version: crate::HOST_RUNTIME_VERSION,
            module_timeout_secs: 10 * 60,
            module_output_limit_bytes: 1_000_000,
            env: BTreeMap::new(),
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.module_timeout_secs == 0 {
            return Err(anyhow!("module_timeout_secs must be > 0"));
        }
        if self.module_output_limit_bytes == 0 {
            return Err(anyhow!("module_output_limit_bytes must be > 0"));
        }
        if self.artifacts_dir.as_os_str().is_empty() {
            return Err(anyhow!("artifacts_dir must not be empty"));
        }
        Ok(())
    }

    pub fn module_timeout(&self) -> Duration {
        Duration::from_secs(self.module_timeout_secs)
    }

    /// Resolve relative directories against `base`.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.modules_dir.is_relative() {
            self.modules_dir = base.join(&self.modules_dir);
        }
        if self.artifacts_dir.is_relative() {
            self.artifacts_dir = base.join(&self.artifacts_dir);
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `KernelConfig::default()`.
pub fn load_config(path: &Path) -> Result<KernelConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = KernelConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: KernelConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

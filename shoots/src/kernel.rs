//! Top-level run orchestration.
//!
//! One run: plan → artifact dir → modules → registry → dispatch → result →
//! classification → resolution. Stages are sequential; only module execution
//! may block.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::classify;
use crate::core::plan::Plan;
use crate::core::resolution::Resolution;
use crate::core::types::RunState;
use crate::exit_codes;
use crate::io::artifacts::ArtifactStore;
use crate::io::config::KernelConfig;
use crate::io::loader::ModuleLoader;
use crate::runtime::engine::RuntimeEngine;
use crate::runtime::helper::DeterministicHelper;
use crate::runtime::module::CancellationSignal;
use crate::runtime::narrator::{LineSink, TextNarrator};
use crate::runtime::protocol::{RuntimeContext, RuntimeRequest};
use crate::runtime::registry::ModuleRegistry;

/// Per-run inputs that are not part of the plan.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Merged over the configured env; these entries win.
    pub env: BTreeMap<String, String>,
    pub cancel: CancellationSignal,
}

/// What a run reports back to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRunResult {
    pub hash: String,
    pub folder: PathBuf,
    pub state: RunState,
    /// Error code, present only when the run did not succeed.
    pub reason: Option<String>,
}

impl BuildRunResult {
    pub fn exit_code(&self) -> i32 {
        exit_codes::for_state(self.state)
    }
}

pub struct BuildKernel {
    config: KernelConfig,
    loader: Box<dyn ModuleLoader>,
    sink: LineSink,
    store: ArtifactStore,
}

impl BuildKernel {
    pub fn new(config: KernelConfig, loader: Box<dyn ModuleLoader>, sink: LineSink) -> Self {
        let store = ArtifactStore::new(config.artifacts_dir.clone());
        Self {
            config,
            loader,
            sink,
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn run(&self, input: &str) -> Result<BuildRunResult> {
        self.run_with(input, RunOptions::default())
    }

    /// Execute one run. `Err` means a fatal fault; every expected failure
    /// comes back as a classified `BuildRunResult`.
    #[instrument(skip_all)]
    pub fn run_with(&self, input: &str, options: RunOptions) -> Result<BuildRunResult> {
        let plan = Plan::from_input(input)?;
        debug!(hash = %plan.hash, command_id = %plan.command_id, "plan computed");
        let paths = self.store.prepare(&plan)?;

        let registry = Arc::new(self.build_registry()?);
        let engine = Arc::new(
            RuntimeEngine::new(registry)
                .with_narrator(Arc::new(TextNarrator::new(self.sink.clone())))
                .with_helper(Arc::new(DeterministicHelper)),
        );

        let mut env = self.config.env.clone();
        env.extend(options.env);
        let context = RuntimeContext {
            session_id: plan.hash.clone(),
            correlation_id: new_correlation_id(),
            env,
            services: engine.clone(),
        };
        let request = RuntimeRequest::new(plan.command_id.as_str(), context);

        let result = engine
            .execute(&plan.text, &request, &options.cancel)
            .with_context(|| format!("execute {}", plan.command_id))?;
        self.store.write_result(&paths, &result)?;

        let state = classify(&result);
        let resolution = (state != RunState::Success).then(|| Resolution::build(state, &result));
        self.store.write_resolution(&paths, resolution.as_ref())?;

        let reason = result
            .error
            .as_ref()
            .filter(|_| state != RunState::Success)
            .map(|error| error.code.to_string());
        info!(hash = %plan.hash, state = state.as_str(), reason = ?reason, "run classified");
        Ok(BuildRunResult {
            hash: plan.hash,
            folder: paths.dir,
            state,
            reason,
        })
    }

    fn build_registry(&self) -> Result<ModuleRegistry> {
        let modules_dir = &self.config.modules_dir;
        self.emit(&format!("[builder] modulesDir = {}", modules_dir.display()));
        let modules = self
            .loader
            .load_from_directory(modules_dir)
            .with_context(|| format!("load modules from {}", modules_dir.display()))?;
        let registry = ModuleRegistry::build(self.config.runtime_version, modules);
        self.report_registry(&registry);
        Ok(registry)
    }

    fn report_registry(&self, registry: &ModuleRegistry) {
        self.emit(&format!(
            "[builder] loaded modules = {}",
            registry.modules().count()
        ));
        for module in registry.modules() {
            self.emit(&format!(
                "[builder] module: {} v{}",
                module.module_id(),
                module.module_version()
            ));
            for spec in registry.commands_of(module.module_id()) {
                self.emit(&format!("[builder]   command: {}", spec.command_id));
            }
        }
        for excluded in registry.excluded() {
            self.emit(&format!(
                "[builder] excluded: {} v{} ({})",
                excluded.module_id, excluded.version, excluded.reason
            ));
        }
        for conflict in registry.conflicts() {
            self.emit(&format!(
                "[builder] conflict: {} owned by {}, ignored from {}",
                conflict.command_id, conflict.kept_module, conflict.ignored_module
            ));
        }
    }

    fn emit(&self, line: &str) {
        if let Err(err) = (self.sink)(line) {
            warn!(%err, "line sink failed");
        }
    }
}

/// 128 random bits as 32 lowercase hex characters.
fn new_correlation_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

//! Command resolution and dispatch.
//!
//! The engine resolves a request to its owning module (or the helper),
//! invokes it, and narrates each phase. It never reinterprets a module's
//! result.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::types::{CommandSpec, RuntimeError, RuntimeResult};
use crate::runtime::helper::Helper;
use crate::runtime::module::CancellationSignal;
use crate::runtime::narrator::Narrator;
use crate::runtime::protocol::{RuntimeRequest, RuntimeServices};
use crate::runtime::registry::ModuleRegistry;

/// Reserved introspection command id.
pub const HELP_COMMAND_ID: &str = "help";

/// Where a command id is routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Introspection; carries the command to describe (empty for a listing).
    Help(String),
    Module,
}

pub struct RuntimeEngine {
    registry: Arc<ModuleRegistry>,
    narrator: Option<Arc<dyn Narrator>>,
    helper: Option<Arc<dyn Helper>>,
}

impl RuntimeEngine {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            narrator: None,
            helper: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_helper(mut self, helper: Arc<dyn Helper>) -> Self {
        self.helper = Some(helper);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Route `command_id`. Help routing only applies when a helper is installed.
    pub fn route(&self, command_id: &str) -> Route {
        if self.helper.is_some() {
            let trimmed = command_id.trim();
            if trimmed == HELP_COMMAND_ID {
                return Route::Help(String::new());
            }
            if let Some(topic) = trimmed
                .strip_prefix(HELP_COMMAND_ID)
                .and_then(|rest| rest.strip_prefix(char::is_whitespace))
            {
                return Route::Help(topic.trim().to_string());
            }
        }
        Route::Module
    }

    /// Dispatch one request, narrating every phase.
    ///
    /// `Err` only when a module reports a fatal fault.
    #[instrument(skip_all, fields(command_id = %request.command_id))]
    pub fn execute(
        &self,
        plan_text: &str,
        request: &RuntimeRequest,
        cancel: &CancellationSignal,
    ) -> Result<RuntimeResult> {
        self.narrate("plan", |narrator| narrator.on_plan(plan_text));

        let result = match self.route(&request.command_id) {
            Route::Help(topic) => {
                let help_request = RuntimeRequest {
                    command_id: topic,
                    ..request.clone()
                };
                self.help_result(&help_request)
            }
            Route::Module => self.dispatch_to_module(request, cancel)?,
        };

        self.narrate("result", |narrator| narrator.on_result(&result));
        if let Some(error) = &result.error {
            self.narrate("error", |narrator| narrator.on_error(error));
        }
        Ok(result)
    }

    /// Explicit help entry point. A blank command id lists every command.
    pub fn execute_help(&self, request: &RuntimeRequest) -> RuntimeResult {
        self.help_result(request)
    }

    fn help_result(&self, request: &RuntimeRequest) -> RuntimeResult {
        match &self.helper {
            Some(helper) => {
                debug!(topic = %request.command_id, "delegating to helper");
                helper.help(request)
            }
            None => RuntimeResult::fail(RuntimeError::unknown_command(&request.command_id)),
        }
    }

    fn dispatch_to_module(
        &self,
        request: &RuntimeRequest,
        cancel: &CancellationSignal,
    ) -> Result<RuntimeResult> {
        let (Some(spec), Some(module)) = (
            self.registry.get_command(&request.command_id),
            self.registry.resolve_module(&request.command_id),
        ) else {
            debug!("no module owns command");
            return Ok(RuntimeResult::fail(RuntimeError::unknown_command(
                &request.command_id,
            )));
        };

        self.narrate("command", |narrator| narrator.on_command(spec, request));
        debug!(module_id = module.module_id(), "dispatching to module");
        module.execute(request, cancel)
    }

    fn narrate<F>(&self, event: &str, call: F)
    where
        F: FnOnce(&dyn Narrator) -> Result<()>,
    {
        if let Some(narrator) = &self.narrator
            && let Err(err) = call(narrator.as_ref())
        {
            warn!(event, err = %format!("{err:#}"), "narrator callback failed");
        }
    }
}

impl RuntimeServices for RuntimeEngine {
    fn get_command(&self, command_id: &str) -> Option<CommandSpec> {
        self.registry.get_command(command_id).cloned()
    }

    fn get_all_commands(&self) -> Vec<CommandSpec> {
        self.registry.get_all_commands().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::ErrorCode;
    use crate::runtime::helper::DeterministicHelper;
    use crate::runtime::narrator::TextNarrator;
    use crate::runtime::protocol::RuntimeContext;
    use crate::test_support::{CapturedLines, ScriptedModule};
    use anyhow::anyhow;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct FailingNarrator;

    impl Narrator for FailingNarrator {
        fn on_plan(&self, _: &str) -> Result<()> {
            Err(anyhow!("plan sink closed"))
        }
        fn on_command(&self, _: &CommandSpec, _: &RuntimeRequest) -> Result<()> {
            Err(anyhow!("command sink closed"))
        }
        fn on_result(&self, _: &RuntimeResult) -> Result<()> {
            Err(anyhow!("result sink closed"))
        }
        fn on_error(&self, _: &RuntimeError) -> Result<()> {
            Err(anyhow!("error sink closed"))
        }
    }

    fn engine_with(modules: Vec<Arc<ScriptedModule>>) -> Arc<RuntimeEngine> {
        let handles = modules
            .into_iter()
            .map(|module| module as crate::runtime::module::ModuleHandle)
            .collect();
        let registry = ModuleRegistry::build(crate::HOST_RUNTIME_VERSION, handles);
        Arc::new(RuntimeEngine::new(Arc::new(registry)).with_helper(Arc::new(DeterministicHelper)))
    }

    fn request(engine: &Arc<RuntimeEngine>, command_id: &str) -> RuntimeRequest {
        RuntimeRequest::new(
            command_id,
            RuntimeContext {
                session_id: "session".to_string(),
                correlation_id: "corr".to_string(),
                env: BTreeMap::new(),
                services: engine.clone(),
            },
        )
    }

    #[test]
    fn routes_help_forms() {
        let engine = engine_with(Vec::new());
        assert_eq!(engine.route("help"), Route::Help(String::new()));
        assert_eq!(engine.route("  help  "), Route::Help(String::new()));
        assert_eq!(
            engine.route("help core.ping"),
            Route::Help("core.ping".to_string())
        );
        assert_eq!(engine.route("helpers.run"), Route::Module);
        assert_eq!(engine.route("core.ping"), Route::Module);

        let bare = RuntimeEngine::new(Arc::new(ModuleRegistry::build(
            crate::HOST_RUNTIME_VERSION,
            Vec::new(),
        )));
        assert_eq!(bare.route("help"), Route::Module);
    }

    #[test]
    fn returns_module_result_unchanged() {
        let failure = RuntimeResult::fail(
            RuntimeError::new(ErrorCode::Other("quota_exceeded".into()), "slow down")
                .with_details(json!({"retry_after": 30}).to_string()),
        );
        let module = Arc::new(ScriptedModule::new("q").with_result("q.run", failure.clone()));
        let engine = engine_with(vec![module.clone()]);

        let result = engine
            .execute("plan", &request(&engine, "q.run"), &CancellationSignal::new())
            .expect("execute");

        assert_eq!(result, failure);
        assert_eq!(module.calls(), vec!["q.run"]);
    }

    #[test]
    fn unknown_command_does_not_invoke_modules() {
        let module = Arc::new(ScriptedModule::new("core").with_commands(&["core.ping"]));
        let engine = engine_with(vec![module.clone()]);

        let result = engine
            .execute(
                "plan",
                &request(&engine, "nonexistent.command"),
                &CancellationSignal::new(),
            )
            .expect("execute");

        assert_eq!(
            result,
            RuntimeResult::fail(RuntimeError::unknown_command("nonexistent.command"))
        );
        assert!(module.calls().is_empty());
    }

    #[test]
    fn narrates_in_fixed_order() {
        let module = Arc::new(ScriptedModule::new("fs").with_result(
            "fs.read",
            RuntimeResult::fail(
                RuntimeError::new(ErrorCode::MissingFile, "no input").with_details("/tmp/x.txt"),
            ),
        ));
        let captured = CapturedLines::new();
        let handles = vec![module as crate::runtime::module::ModuleHandle];
        let registry = Arc::new(ModuleRegistry::build(crate::HOST_RUNTIME_VERSION, handles));
        let engine = Arc::new(
            RuntimeEngine::new(registry)
                .with_narrator(Arc::new(TextNarrator::new(captured.sink()))),
        );

        engine
            .execute("PLAN", &request(&engine, "fs.read"), &CancellationSignal::new())
            .expect("execute");

        assert_eq!(
            captured.lines(),
            vec![
                "[plan] PLAN",
                "[command] fs.read args={}",
                "[result] failed (missing_file)",
                "[error] missing_file: no input",
            ]
        );
    }

    #[test]
    fn help_path_skips_on_command() {
        let captured = CapturedLines::new();
        let handles = vec![
            Arc::new(ScriptedModule::new("b").with_commands(&["b.two"]))
                as crate::runtime::module::ModuleHandle,
            Arc::new(ScriptedModule::new("a").with_commands(&["a.one"]))
                as crate::runtime::module::ModuleHandle,
        ];
        let registry = Arc::new(ModuleRegistry::build(crate::HOST_RUNTIME_VERSION, handles));
        let engine = Arc::new(
            RuntimeEngine::new(registry)
                .with_helper(Arc::new(DeterministicHelper))
                .with_narrator(Arc::new(TextNarrator::new(captured.sink()))),
        );

        let result = engine
            .execute("PLAN", &request(&engine, "help"), &CancellationSignal::new())
            .expect("execute");

        assert_eq!(
            result.output,
            Some(json!({"commands": ["a.one", "b.two"], "count": 2}))
        );
        assert_eq!(captured.lines(), vec!["[plan] PLAN", "[result] ok"]);
    }

    #[test]
    fn help_with_topic_describes_command() {
        let engine = engine_with(vec![Arc::new(
            ScriptedModule::new("core").with_commands(&["core.ping"]),
        )]);
        let result = engine
            .execute(
                "plan",
                &request(&engine, "help core.ping"),
                &CancellationSignal::new(),
            )
            .expect("execute");
        let output = result.output.expect("output");
        assert_eq!(output["commandId"], json!("core.ping"));
        assert_eq!(output["usage"], json!("core.ping"));
    }

    #[test]
    fn explicit_help_with_blank_id_lists_commands() {
        let engine = engine_with(vec![Arc::new(
            ScriptedModule::new("core").with_commands(&["core.ping"]),
        )]);
        let result = engine.execute_help(&request(&engine, "   "));
        assert_eq!(
            result.output,
            Some(json!({"commands": ["core.ping"], "count": 1}))
        );
    }

    #[test]
    fn failing_narrator_does_not_fail_dispatch() {
        let module = Arc::new(ScriptedModule::new("core").with_commands(&["core.ping"]));
        let handles = vec![module.clone() as crate::runtime::module::ModuleHandle];
        let registry = Arc::new(ModuleRegistry::build(crate::HOST_RUNTIME_VERSION, handles));
        let engine = Arc::new(RuntimeEngine::new(registry).with_narrator(Arc::new(FailingNarrator)));

        let result = engine
            .execute("plan", &request(&engine, "core.ping"), &CancellationSignal::new())
            .expect("execute");

        assert!(result.ok);
        assert_eq!(module.calls(), vec!["core.ping"]);
    }

    #[test]
    fn module_fault_propagates() {
        let module = Arc::new(ScriptedModule::new("bad").with_fault("bad.cmd", "disk vanished"));
        let engine = engine_with(vec![module]);
        let err = engine
            .execute("plan", &request(&engine, "bad.cmd"), &CancellationSignal::new())
            .unwrap_err();
        assert!(err.to_string().contains("disk vanished"));
    }
}

//! The `core` module: liveness checks for the runtime itself.

use anyhow::Result;

use crate::core::types::{CommandSpec, RuntimeError, RuntimeResult};
use crate::core::version::ModuleVersion;
use crate::runtime::module::{CancellationSignal, Module};
use crate::runtime::protocol::RuntimeRequest;

pub const PING_COMMAND_ID: &str = "core.ping";

#[derive(Debug, Clone, Copy, Default)]
pub struct CoreModule;

impl Module for CoreModule {
    fn module_id(&self) -> &str {
        "core"
    }

    fn module_version(&self) -> ModuleVersion {
        ModuleVersion::new(1, 0, 0)
    }

    fn min_runtime_version(&self) -> ModuleVersion {
        ModuleVersion::new(1, 0, 0)
    }

    fn max_runtime_version(&self) -> ModuleVersion {
        ModuleVersion::new(1, 9, 0)
    }

    fn describe(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new(PING_COMMAND_ID, "Ping command", Vec::new())]
    }

    fn execute(
        &self,
        request: &RuntimeRequest,
        _cancel: &CancellationSignal,
    ) -> Result<RuntimeResult> {
        if request.command_id != PING_COMMAND_ID {
            return Ok(RuntimeResult::fail(RuntimeError::unknown_command(
                &request.command_id,
            )));
        }
        Ok(RuntimeResult::success("pong"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::taxonomy::ErrorCode;
    use crate::runtime::protocol::RuntimeContext;
    use crate::runtime::registry::ModuleRegistry;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn request(command_id: &str) -> RuntimeRequest {
        RuntimeRequest::new(
            command_id,
            RuntimeContext {
                session_id: "s".to_string(),
                correlation_id: "c".to_string(),
                env: BTreeMap::new(),
                services: Arc::new(ModuleRegistry::build(
                    crate::HOST_RUNTIME_VERSION,
                    Vec::new(),
                )),
            },
        )
    }

    #[test]
    fn ping_returns_pong() {
        let result = CoreModule
            .execute(&request("core.ping"), &CancellationSignal::new())
            .expect("execute");
        assert_eq!(result, RuntimeResult::success(json!("pong")));
    }

    #[test]
    fn other_ids_are_unknown() {
        let result = CoreModule
            .execute(&request("core.pong"), &CancellationSignal::new())
            .expect("execute");
        let error = result.error.expect("error");
        assert_eq!(error.code, ErrorCode::UnknownCommand);
        assert_eq!(error.message, "core.pong");
    }

    #[test]
    fn hosted_by_the_current_runtime() {
        assert!(crate::HOST_RUNTIME_VERSION.within(
            CoreModule.min_runtime_version(),
            CoreModule.max_runtime_version()
        ));
    }
}

//! Modules compiled into the binary.

use std::sync::Arc;

use crate::runtime::module::ModuleHandle;

pub mod core;

/// Built-in modules in load order.
pub fn builtin_modules() -> Vec<ModuleHandle> {
    vec![Arc::new(self::core::CoreModule) as ModuleHandle]
}

//! Deterministic command-execution kernel for a pluggable build tool.
//!
//! One textual command becomes a content-addressed plan, is dispatched to
//! the plugin module that owns it, and ends in a classified run state with a
//! persisted remediation document.
//!
//! - **[`core`]**: pure logic (plan hashing, error taxonomy, classification,
//!   resolution documents). No I/O.
//! - **[`runtime`]**: module contract, registry, narrator and dispatch engine.
//! - **[`io`]**: config, artifact store, child processes, module discovery.
//! - **[`modules`]**: modules compiled into the binary.
//!
//! [`kernel`] ties these together for one run.

use crate::core::version::ModuleVersion;

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod kernel;
pub mod logging;
pub mod modules;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Runtime version this build declares to modules.
pub const HOST_RUNTIME_VERSION: ModuleVersion = ModuleVersion::new(1, 0, 0);

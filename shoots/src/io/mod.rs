//! Side-effecting operations: config, artifact store, child processes and
//! module discovery.

pub mod artifacts;
pub mod config;
pub mod loader;
pub mod process;
pub mod process_module;

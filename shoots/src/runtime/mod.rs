//! Dispatch contracts between the kernel, the engine, and modules.
//!
//! Everything here is synchronous and in-memory. Modules may block inside
//! [`module::Module::execute`]; nothing else does.

pub mod engine;
pub mod helper;
pub mod module;
pub mod narrator;
pub mod protocol;
pub mod registry;

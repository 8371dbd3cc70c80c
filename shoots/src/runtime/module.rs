//! The capability set every plugin module implements.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::core::types::{CommandSpec, RuntimeResult};
use crate::core::version::ModuleVersion;
use crate::runtime::protocol::RuntimeRequest;

/// Cooperative cancellation flag shared between the caller and a module.
///
/// In-process modules poll [`is_cancelled`] and return early if they choose
/// to. Process-backed modules kill their child when the flag flips.
///
/// [`is_cancelled`]: CancellationSignal::is_cancelled
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A versioned plugin exposing a command catalogue and an execution entry point.
///
/// Expected failures (missing inputs, absent tools) are returned as
/// `Ok(RuntimeResult { ok: false, .. })`. `Err` is reserved for conditions
/// that must abort the whole run.
pub trait Module: Send + Sync {
    fn module_id(&self) -> &str;

    fn module_version(&self) -> ModuleVersion;

    /// Oldest runtime this module can be hosted by.
    fn min_runtime_version(&self) -> ModuleVersion;

    /// Newest runtime this module can be hosted by.
    fn max_runtime_version(&self) -> ModuleVersion;

    /// Command catalogue. Must be stable for the lifetime of the process.
    fn describe(&self) -> Vec<CommandSpec>;

    fn execute(
        &self,
        request: &RuntimeRequest,
        cancel: &CancellationSignal,
    ) -> Result<RuntimeResult>;
}

/// Shared handle to a loaded module.
pub type ModuleHandle = Arc<dyn Module>;

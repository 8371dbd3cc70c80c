//! Deterministic classification of a dispatch outcome into a run state.

use crate::core::types::{RunState, RuntimeResult};

/// Classify a result. Total over every `(ok, error)` combination.
///
/// - `ok` → `Success` (an error attached to a successful result is ignored).
/// - not `ok` and no error → `Invalid`.
/// - otherwise the error code's taxonomy row decides.
pub fn classify(result: &RuntimeResult) -> RunState {
    if result.ok {
        return RunState::Success;
    }
    match &result.error {
        None => RunState::Invalid,
        Some(error) => error.code.remediation().state,
    }
}

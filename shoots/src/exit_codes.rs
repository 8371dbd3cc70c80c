//! Stable exit codes for the `shoots` CLI.

use crate::core::types::RunState;

/// Run state `Success`.
pub const SUCCESS: i32 = 0;
/// Run state `Invalid`, argument errors, and fatal faults.
pub const INVALID: i32 = 1;
/// Run state `Blocked`: an external actor must act before a retry.
pub const BLOCKED: i32 = 2;

pub fn for_state(state: RunState) -> i32 {
    match state {
        RunState::Success => SUCCESS,
        RunState::Blocked => BLOCKED,
        RunState::Invalid => INVALID,
    }
}
